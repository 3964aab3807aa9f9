// SLO readout

use autoads_server::AdminUser;
use axum::{extract::State, routing::get, Json, Router};

use super::AppState;
use crate::services::SloReport;

pub fn routes() -> Router<AppState> {
    Router::new().route("/slo", get(slo))
}

/// GET /api/v1/console/slo - P95 latency and error rate per service
#[utoipa::path(
    get,
    path = "/api/v1/console/slo",
    responses((status = 200, description = "One entry per watched service", body = SloReport)),
    tag = "observability"
)]
pub async fn slo(State(state): State<AppState>, _admin: AdminUser) -> Json<SloReport> {
    Json(state.slo.collect().await)
}
