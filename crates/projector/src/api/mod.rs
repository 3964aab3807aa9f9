// HTTP API routes
//
// Push subscriptions may target either /push or the namespaced path.

pub mod push;

use std::sync::Arc;

use axum::{routing::post, Router};

use crate::projector::Projector;

pub const API_BASE: &str = "/api/v1/projector";

#[derive(Clone)]
pub struct AppState {
    pub projector: Arc<Projector>,
}

/// Create all Projector routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/push", post(push::push))
        .route(&format!("{}/push", API_BASE), post(push::push))
        .with_state(state)
}
