// Adscenter limits policy routes

use autoads_server::{AdminUser, ApiError, ErrorBody};
use axum::{body::Bytes, extract::State, routing::get, Json, Router};

use super::AppState;
use crate::services::LimitsPolicy;

pub fn routes() -> Router<AppState> {
    Router::new().route("/limits/policy", get(get_policy).put(put_policy))
}

/// GET /api/v1/console/limits/policy - Latest policy version
#[utoipa::path(
    get,
    path = "/api/v1/console/limits/policy",
    responses(
        (status = 200, description = "Policy", body = LimitsPolicy),
        (status = 500, description = "No policy secret configured", body = ErrorBody)
    ),
    tag = "limits"
)]
pub async fn get_policy(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<LimitsPolicy>, ApiError> {
    Ok(Json(state.limits.get().await?))
}

/// PUT /api/v1/console/limits/policy - Append a policy version (JSON or text)
#[utoipa::path(
    put,
    path = "/api/v1/console/limits/policy",
    request_body(content = String, description = "JSON policy or plain text"),
    responses(
        (status = 200, description = "Stored policy", body = LimitsPolicy),
        (status = 400, description = "Empty body", body = ErrorBody)
    ),
    tag = "limits"
)]
pub async fn put_policy(
    State(state): State<AppState>,
    admin: AdminUser,
    body: Bytes,
) -> Result<Json<LimitsPolicy>, ApiError> {
    tracing::info!(actor = admin.actor(), "Limits policy update");
    Ok(Json(state.limits.put(&body).await?))
}
