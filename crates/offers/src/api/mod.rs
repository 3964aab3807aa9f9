// HTTP API routes

pub mod billing;
pub mod offers;

use std::sync::Arc;

use autoads_core::IdempotencyStore;
use autoads_server::AuthConfig;
use axum::{extract::FromRef, Router};

use crate::services::{Billing, OfferService};

pub const OFFERS_BASE: &str = "/api/v1/offers";
pub const BILLING_BASE: &str = "/api/v1/billing";

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthConfig>,
    pub offers: Arc<OfferService>,
    pub billing: Arc<Billing>,
    pub idempotency: Arc<dyn IdempotencyStore>,
}

impl FromRef<AppState> for Arc<AuthConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Create all Offers and Billing routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .nest(OFFERS_BASE, offers::routes())
        .nest(BILLING_BASE, billing::routes())
        .with_state(state)
}
