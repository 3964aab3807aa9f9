// HTTP API routes
//
// Every route lives under /api/v1/siterank and shares one AppState.

pub mod analyses;

use std::sync::Arc;

use autoads_core::IdempotencyStore;
use autoads_server::AuthConfig;
use axum::{extract::FromRef, Router};

use crate::services::Analyzer;

pub const API_BASE: &str = "/api/v1/siterank";

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthConfig>,
    pub analyzer: Arc<Analyzer>,
    pub idempotency: Arc<dyn IdempotencyStore>,
}

impl FromRef<AppState> for Arc<AuthConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Create all Siterank routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .nest(API_BASE, analyses::routes())
        .with_state(state)
}
