// HTTP API routes
//
// Brand checks and coverage reads are user-facing; the offline audits under
// /internal are for operators and schedulers.

pub mod brand;
pub mod offline;

use std::sync::Arc;

use autoads_server::AuthConfig;
use axum::{extract::FromRef, Router};

use crate::services::BrandEngine;

pub const API_BASE: &str = "/api/v1/recommend";

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthConfig>,
    pub engine: Arc<BrandEngine>,
}

impl FromRef<AppState> for Arc<AuthConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Create all Recommend routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .nest(API_BASE, brand::routes().merge(offline::routes()))
        .with_state(state)
}
