// Liveness, readiness and metrics endpoints

use std::sync::Arc;
use std::time::Duration;

use autoads_core::{ErrorCode, Readiness};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::metrics::HttpMetrics;

const READY_TIMEOUT: Duration = Duration::from_secs(1);

/// Shared operational state of a service
#[derive(Clone)]
pub struct OpsState {
    pub service: &'static str,
    pub metrics: Arc<HttpMetrics>,
    pub readiness: Option<Arc<dyn Readiness>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

async fn health(State(state): State<OpsState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.service,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn readyz(State(state): State<OpsState>) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(readiness) = state.readiness else {
        return Ok(Json(json!({ "status": "ready", "checks": { "db": "skipped" } })));
    };

    let outcome = tokio::time::timeout(READY_TIMEOUT, readiness.ping()).await;
    let failure = match outcome {
        Ok(Ok(())) => return Ok(Json(json!({ "status": "ready", "checks": { "db": "ok" } }))),
        Ok(Err(e)) => e.to_string(),
        Err(_) => "timeout".to_string(),
    };

    tracing::warn!("Readiness check failed: {}", failure);
    Err(ApiError::new(ErrorCode::NotReady, "Service not ready").with_details(json!({ "db": failure })))
}

async fn metrics(State(state): State<OpsState>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}

pub fn routes(state: OpsState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}
