// HTTP API routes

pub mod alerts;
pub mod bulk_actions;
pub mod config;
pub mod events;
pub mod health;
pub mod limits;
pub mod slo;
pub mod stats;
pub mod users;

use std::sync::Arc;

use autoads_core::{ConsoleStore, EventStore, NotificationStore};
use autoads_server::AuthConfig;
use axum::{extract::FromRef, routing::get, Router};

use crate::services::{AccountAdmin, AdscenterProxy, HealthProber, LimitsPolicyStore, SloCollector};

pub const API_BASE: &str = "/api/v1/console";

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthConfig>,
    pub accounts: Arc<AccountAdmin>,
    pub console: Arc<dyn ConsoleStore>,
    pub events: Arc<dyn EventStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub slo: Arc<SloCollector>,
    pub health: Arc<HealthProber>,
    pub limits: Arc<LimitsPolicyStore>,
    pub adscenter: Arc<AdscenterProxy>,
}

impl FromRef<AppState> for Arc<AuthConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Create all Console routes
pub fn routes(state: AppState) -> Router {
    let console = Router::new()
        .merge(users::routes())
        .merge(stats::routes())
        .merge(slo::routes())
        .merge(limits::routes())
        .merge(events::routes())
        .merge(bulk_actions::routes())
        .merge(alerts::routes())
        .merge(config::routes());

    Router::new()
        .nest(API_BASE, console)
        .route("/api/health", get(health::health))
        .with_state(state)
}
