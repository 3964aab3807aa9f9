// Broker push delivery

use autoads_cloud::PushRequest;
use autoads_core::events::UNKNOWN;
use autoads_server::{ApiError, ErrorBody};
use axum::{body::Bytes, extract::State, http::StatusCode};

use super::AppState;

/// POST /api/v1/projector/push - Project one pushed event
#[utoipa::path(
    post,
    path = "/api/v1/projector/push",
    request_body(
        content = String,
        content_type = "application/json",
        description = "Push JSON: {message: {data: base64 envelope, attributes}, subscription}"
    ),
    responses(
        (status = 204, description = "Projected, already projected, or acked without an event type"),
        (status = 400, description = "Payload is not an event envelope", body = ErrorBody)
    ),
    tag = "projector"
)]
pub async fn push(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let request: PushRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::invalid_argument(format!("Invalid push body: {}", e)))?;
    let subscription = request.subscription.clone().unwrap_or_default();
    let envelope = request
        .into_envelope()
        .map_err(|e| ApiError::invalid_argument(e.to_string()))?;
    // Redelivery cannot add a type, so ack instead of looping
    if envelope.event_type == UNKNOWN {
        tracing::warn!(
            event_id = %envelope.id,
            subscription = %subscription,
            "Acking message without an event type; nothing projected"
        );
        return Ok(StatusCode::NO_CONTENT);
    }

    let inserted = state.projector.project(&envelope).await.map_err(|e| {
        tracing::error!(event_id = %envelope.id, "Failed to project event: {}", e);
        ApiError::from(e)
    })?;
    tracing::info!(
        event_id = %envelope.id,
        event_type = %envelope.event_type,
        subscription = %subscription,
        duplicate = !inserted,
        "Event projected"
    );
    Ok(StatusCode::NO_CONTENT)
}
