// Fan-out health of the watched services

use autoads_server::AdminUser;
use axum::{extract::State, Json};

use super::AppState;
use crate::services::HealthReport;

/// GET /api/health - Per-service status and the overall verdict
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "ok when every service is ready", body = HealthReport)),
    tag = "observability"
)]
pub async fn health(State(state): State<AppState>, _admin: AdminUser) -> Json<HealthReport> {
    Json(state.health.check().await)
}
