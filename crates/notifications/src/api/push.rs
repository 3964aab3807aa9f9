// Broker push delivery

use autoads_cloud::PushRequest;
use autoads_server::{ApiError, ErrorBody};
use axum::{body::Bytes, extract::State, http::StatusCode};

use super::AppState;

/// POST /api/v1/notifications/push - Notify for one pushed event
#[utoipa::path(
    post,
    path = "/api/v1/notifications/push",
    request_body(
        content = String,
        content_type = "application/json",
        description = "Push JSON: {message: {data: base64 envelope, attributes}, subscription}"
    ),
    responses(
        (status = 204, description = "Handled; events that do not notify are acked too"),
        (status = 400, description = "Payload is not decodable", body = ErrorBody)
    ),
    tag = "notifications"
)]
pub async fn push(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let request: PushRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::invalid_argument(format!("Invalid push body: {}", e)))?;
    let envelope = request
        .into_envelope()
        .map_err(|e| ApiError::invalid_argument(e.to_string()))?;

    state.notifier.notify(&envelope).await.map_err(|e| {
        tracing::error!(event_id = %envelope.id, "Failed to write notification: {}", e);
        ApiError::from(e)
    })?;
    Ok(StatusCode::NO_CONTENT)
}
