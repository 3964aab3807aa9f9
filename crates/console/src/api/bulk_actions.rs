// Adscenter bulk-action proxies, called on behalf of the operation owner

use autoads_server::{current_request_id, AdminUser, ApiError, ErrorBody};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use uuid::Uuid;

use super::AppState;
use crate::services::Relayed;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/adscenter/bulk-actions/{id}/snapshots", get(snapshots))
        .route("/adscenter/bulk-actions/{id}/deadletters", get(dead_letters))
        .route("/adscenter/bulk-actions/{id}/deadletters/retry-batch", post(retry_batch))
        .route("/adscenter/bulk-actions/{id}/deadletters/{dl_id}/retry", post(retry_one))
}

fn operation_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::invalid_argument("Bulk action id must be a UUID"))
}

fn json_body(body: &Bytes) -> Result<Option<Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| ApiError::invalid_argument(format!("Invalid JSON body: {}", e)))
}

fn relay(relayed: Relayed) -> Response {
    let status = StatusCode::from_u16(relayed.status).unwrap_or(StatusCode::BAD_GATEWAY);
    if relayed.body.is_null() {
        status.into_response()
    } else {
        (status, Json(relayed.body)).into_response()
    }
}

async fn forward(
    state: &AppState,
    method: reqwest::Method,
    id: &str,
    suffix: &str,
    body: Option<Value>,
) -> Result<Response, ApiError> {
    let relayed = state
        .adscenter
        .forward(method, operation_id(id)?, suffix, body, current_request_id())
        .await?;
    Ok(relay(relayed))
}

/// GET /api/v1/console/adscenter/bulk-actions/{id}/snapshots - Snapshots of an operation
#[utoipa::path(
    get,
    path = "/api/v1/console/adscenter/bulk-actions/{id}/snapshots",
    params(("id" = String, Path, description = "Bulk operation ID")),
    responses(
        (status = 200, description = "Adscenter response, relayed"),
        (status = 404, description = "Operation not found", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn snapshots(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    forward(&state, reqwest::Method::GET, &id, "/snapshots", None).await
}

/// GET /api/v1/console/adscenter/bulk-actions/{id}/deadletters - Dead letters of an operation
#[utoipa::path(
    get,
    path = "/api/v1/console/adscenter/bulk-actions/{id}/deadletters",
    params(("id" = String, Path, description = "Bulk operation ID")),
    responses(
        (status = 200, description = "Adscenter response, relayed"),
        (status = 404, description = "Operation not found", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn dead_letters(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    forward(&state, reqwest::Method::GET, &id, "/deadletters", None).await
}

/// POST /api/v1/console/adscenter/bulk-actions/{id}/deadletters/retry-batch - Replay pending dead letters
#[utoipa::path(
    post,
    path = "/api/v1/console/adscenter/bulk-actions/{id}/deadletters/retry-batch",
    params(("id" = String, Path, description = "Bulk operation ID")),
    request_body(content = String, content_type = "application/json", description = "Optional JSON body, relayed"),
    responses(
        (status = 200, description = "Adscenter response, relayed"),
        (status = 404, description = "Operation not found", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn retry_batch(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    tracing::info!(actor = admin.actor(), operation_id = %id, "Dead-letter batch retry requested");
    let body = json_body(&body)?;
    forward(&state, reqwest::Method::POST, &id, "/deadletters/retry-batch", body).await
}

/// POST /api/v1/console/adscenter/bulk-actions/{id}/deadletters/{dl_id}/retry - Replay one dead letter
#[utoipa::path(
    post,
    path = "/api/v1/console/adscenter/bulk-actions/{id}/deadletters/{dl_id}/retry",
    params(
        ("id" = String, Path, description = "Bulk operation ID"),
        ("dl_id" = String, Path, description = "Dead letter ID")
    ),
    request_body(content = String, content_type = "application/json", description = "Optional JSON body, relayed"),
    responses(
        (status = 200, description = "Adscenter response, relayed"),
        (status = 404, description = "Operation not found", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn retry_one(
    State(state): State<AppState>,
    admin: AdminUser,
    Path((id, dl_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let dl_id = Uuid::parse_str(&dl_id).map_err(|_| ApiError::invalid_argument("Dead letter id must be a UUID"))?;
    tracing::info!(actor = admin.actor(), operation_id = %id, %dl_id, "Dead-letter retry requested");
    let body = json_body(&body)?;
    let suffix = format!("/deadletters/{}/retry", dl_id);
    forward(&state, reqwest::Method::POST, &id, &suffix, body).await
}
