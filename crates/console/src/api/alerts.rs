// Alert and incident readouts over user notifications

use autoads_core::notification::{DailyIncidents, Notification, Severity};
use autoads_core::NotificationStore;
use autoads_server::{AdminUser, ApiError};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::AppState;

const ALERT_SEVERITIES: [Severity; 2] = [Severity::Warn, Severity::Error];
const DEFAULT_ALERT_HOURS: i64 = 24;
const DEFAULT_ALERT_LIMIT: i64 = 100;
const MAX_ALERT_LIMIT: i64 = 500;
const DEFAULT_INCIDENT_DAYS: i64 = 7;
const MAX_INCIDENT_DAYS: i64 = 90;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(rename_all = "camelCase")]
pub struct AlertQuery {
    /// Look-back window, 24 hours by default
    pub since_hours: Option<i64>,
    pub limit: Option<i64>,
    /// Only `warn` or only `error`; both when absent
    pub severity: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct IncidentQuery {
    /// Days to aggregate, 7 by default, at most 90
    pub days: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertList {
    pub items: Vec<Notification>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IncidentList {
    pub items: Vec<DailyIncidents>,
}

fn positive_or(value: Option<i64>, default: i64, max: i64) -> i64 {
    match value {
        Some(v) if v > 0 => v.min(max),
        _ => default,
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/alerts", get(alerts))
        .route("/incidents", get(incidents))
}

/// GET /api/v1/console/alerts - Warn and error notifications across users
#[utoipa::path(
    get,
    path = "/api/v1/console/alerts",
    params(AlertQuery),
    responses((status = 200, description = "Newest first", body = AlertList)),
    tag = "alerts"
)]
pub async fn alerts(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<AlertQuery>,
) -> Result<Json<AlertList>, ApiError> {
    let severities: Vec<Severity> = match query.severity.as_deref().map(str::parse::<Severity>) {
        None => ALERT_SEVERITIES.to_vec(),
        Some(Ok(severity)) if ALERT_SEVERITIES.contains(&severity) => vec![severity],
        Some(_) => return Err(ApiError::invalid_argument("severity must be warn or error")),
    };
    let hours = positive_or(query.since_hours, DEFAULT_ALERT_HOURS, MAX_INCIDENT_DAYS * 24);
    let limit = positive_or(query.limit, DEFAULT_ALERT_LIMIT, MAX_ALERT_LIMIT);
    let items = state
        .notifications
        .by_severity(&severities, Utc::now() - Duration::hours(hours), limit)
        .await?;
    Ok(Json(AlertList { items }))
}

/// GET /api/v1/console/incidents - Warn and error counts per day
#[utoipa::path(
    get,
    path = "/api/v1/console/incidents",
    params(IncidentQuery),
    responses((status = 200, description = "One row per day and severity", body = IncidentList)),
    tag = "alerts"
)]
pub async fn incidents(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<IncidentQuery>,
) -> Result<Json<IncidentList>, ApiError> {
    let days = positive_or(query.days, DEFAULT_INCIDENT_DAYS, MAX_INCIDENT_DAYS);
    let items = state
        .notifications
        .daily_incidents(Utc::now() - Duration::days(days))
        .await?;
    Ok(Json(IncidentList { items }))
}
