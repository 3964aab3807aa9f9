// HTTP API routes

pub mod push;
pub mod recent;

use std::sync::Arc;

use autoads_core::NotificationStore;
use autoads_server::AuthConfig;
use axum::{extract::FromRef, routing::post, Router};

use crate::notifier::Notifier;

pub const API_BASE: &str = "/api/v1/notifications";

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthConfig>,
    pub notifier: Arc<Notifier>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl FromRef<AppState> for Arc<AuthConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Create all Notifications routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/push", post(push::push))
        .nest(API_BASE, recent::routes().route("/push", post(push::push)))
        .with_state(state)
}
