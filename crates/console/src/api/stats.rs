// Aggregate counters

use autoads_core::console::{ConsoleStats, TokenStats};
use autoads_core::ConsoleStore;
use autoads_server::{AdminUser, ApiError};
use axum::{extract::State, routing::get, Json, Router};

use super::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tokens/stats", get(token_stats))
        .route("/stats", get(stats))
}

/// GET /api/v1/console/tokens/stats - Ledger totals
#[utoipa::path(
    get,
    path = "/api/v1/console/tokens/stats",
    responses((status = 200, description = "Token totals, -1 for missing tables", body = TokenStats)),
    tag = "stats"
)]
pub async fn token_stats(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<TokenStats>, ApiError> {
    Ok(Json(state.console.token_stats().await?))
}

/// GET /api/v1/console/stats - Row counts per domain table
#[utoipa::path(
    get,
    path = "/api/v1/console/stats",
    responses((status = 200, description = "Counts, -1 for missing tables", body = ConsoleStats)),
    tag = "stats"
)]
pub async fn stats(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<ConsoleStats>, ApiError> {
    Ok(Json(state.console.stats().await?))
}
