// Account-level routes: preflight, accessible accounts, effective limits

use autoads_core::ratelimit::ActionKind;
use autoads_server::{ApiError, AuthUser, ErrorBody, Json};
use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::AppState;
use crate::ads::customer_of;
use crate::services::{LimitsView, PreflightReport};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreflightRequest {
    /// Customer id to probe (10 digits, dashes allowed)
    #[schema(example = "123-456-7890")]
    #[serde(default)]
    pub account_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountItem {
    #[schema(example = "customers/1234567890")]
    pub resource_name: String,
    #[schema(example = "1234567890")]
    pub id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccountList {
    pub items: Vec<AccountItem>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/preflight", post(preflight))
        .route("/accounts", get(list_accounts))
        .route("/limits/me", get(my_limits))
}

/// POST /api/v1/adscenter/preflight - Probe credentials and account readiness
#[utoipa::path(
    post,
    path = "/api/v1/adscenter/preflight",
    request_body = PreflightRequest,
    responses(
        (status = 200, description = "Preflight report", body = PreflightReport),
        (status = 401, description = "Unauthenticated", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn preflight(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<PreflightRequest>,
) -> Result<Json<PreflightReport>, ApiError> {
    let session = state
        .sessions
        .for_user(user.user_id(), ActionKind::Preflight)
        .await?;
    let report = state.preflight.run(&session, req.account_id.as_deref()).await;
    tracing::info!(user_id = %user.user_id(), summary = ?report.summary, "Preflight finished");
    Ok(Json(report))
}

/// GET /api/v1/adscenter/accounts - Customers reachable with the caller's token
#[utoipa::path(
    get,
    path = "/api/v1/adscenter/accounts",
    responses(
        (status = 200, description = "Accessible customers", body = AccountList),
        (status = 401, description = "Unauthenticated", body = ErrorBody),
        (status = 502, description = "Google Ads error", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn list_accounts(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<AccountList>, ApiError> {
    let session = state
        .sessions
        .for_user(user.user_id(), ActionKind::Diagnose)
        .await?;
    let names = state.ads.list_accessible_customers(&session).await.map_err(|e| {
        tracing::error!("Failed to list accessible customers: {}", e);
        ApiError::from(e)
    })?;

    let items = names
        .into_iter()
        .map(|resource_name| {
            let id = customer_of(&resource_name).unwrap_or_default().to_string();
            AccountItem { resource_name, id }
        })
        .collect();
    Ok(Json(AccountList { items }))
}

/// GET /api/v1/adscenter/limits/me - Plan, effective limits and today's usage
#[utoipa::path(
    get,
    path = "/api/v1/adscenter/limits/me",
    responses(
        (status = 200, description = "Effective limits", body = LimitsView),
        (status = 401, description = "Unauthenticated", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn my_limits(State(state): State<AppState>, user: AuthUser) -> Json<LimitsView> {
    Json(state.limits.me(user.user_id()).await)
}
