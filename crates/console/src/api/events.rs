// Event store query and export

use autoads_core::{EventFilter, EventRecord, EventStore};
use autoads_server::{AdminUser, ApiError, ErrorBody};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::AppState;
use crate::services::events_csv;

pub const DEFAULT_QUERY_LIMIT: i64 = 100;
pub const MAX_QUERY_LIMIT: i64 = 500;
pub const DEFAULT_EXPORT_LIMIT: i64 = 1000;
pub const MAX_EXPORT_LIMIT: i64 = 5000;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(rename_all = "camelCase")]
pub struct EventQuery {
    pub event_name: Option<String>,
    pub aggregate_type: Option<String>,
    pub aggregate_id: Option<String>,
    /// Look-back window, capped at 90 days
    pub since_hours: Option<i64>,
    pub limit: Option<i64>,
}

impl EventQuery {
    fn filter(self, default_limit: i64, max_limit: i64) -> EventFilter {
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let limit = match self.limit {
            Some(l) if l > 0 => l.min(max_limit),
            _ => default_limit,
        };
        EventFilter {
            event_name: non_empty(self.event_name),
            aggregate_type: non_empty(self.aggregate_type),
            aggregate_id: non_empty(self.aggregate_id),
            since: None,
            limit,
        }
        .since_hours(self.since_hours)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventList {
    pub items: Vec<EventRecord>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events))
        .route("/events/export", get(export_events))
        .route("/events/{id}", get(get_event))
}

/// GET /api/v1/console/events - Newest events matching the filters
#[utoipa::path(
    get,
    path = "/api/v1/console/events",
    params(EventQuery),
    responses((status = 200, description = "At most 500 events", body = EventList)),
    tag = "events"
)]
pub async fn list_events(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<EventQuery>,
) -> Result<Json<EventList>, ApiError> {
    let items = state
        .events
        .query(&query.filter(DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT))
        .await?;
    Ok(Json(EventList { items }))
}

/// GET /api/v1/console/events/export - Matching events as CSV
#[utoipa::path(
    get,
    path = "/api/v1/console/events/export",
    params(EventQuery),
    responses((status = 200, description = "CSV, at most 5000 rows", body = String, content_type = "text/csv")),
    tag = "events"
)]
pub async fn export_events(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<EventQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state
        .events
        .query(&query.filter(DEFAULT_EXPORT_LIMIT, MAX_EXPORT_LIMIT))
        .await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"events.csv\""),
        ],
        events_csv(&records),
    ))
}

/// GET /api/v1/console/events/{id} - One event
#[utoipa::path(
    get,
    path = "/api/v1/console/events/{id}",
    params(("id" = String, Path, description = "Event ID")),
    responses(
        (status = 200, description = "Event", body = EventRecord),
        (status = 404, description = "Event not found", body = ErrorBody)
    ),
    tag = "events"
)]
pub async fn get_event(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<EventRecord>, ApiError> {
    state
        .events
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Event {} not found", id)))
}
