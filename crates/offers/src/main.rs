// Offers API server

use std::sync::Arc;

use anyhow::Result;
use autoads_cloud::publisher_from_env;
use autoads_core::EventRecorder;
use autoads_offers::api::{self, AppState};
use autoads_offers::openapi::ApiDoc;
use autoads_offers::services::{Billing, OfferService};
use autoads_server::{build_app, init_service, ops_state, serve, shutdown_token, AuthConfig, ServerConfig};
use autoads_storage::Stores;
use utoipa::OpenApi;

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_service("offers");

    let server_config = ServerConfig::from_env();
    let database_url = std::env::var("DATABASE_URL").ok();
    let stores = Stores::connect(database_url.as_deref(), server_config.run_migrations).await?;
    let ops = ops_state("offers", Some(stores.readiness.clone()))?;
    let recorder = EventRecorder::new(stores.events.clone(), publisher_from_env());

    let state = AppState {
        auth: Arc::new(AuthConfig::from_env()),
        offers: Arc::new(OfferService::new(stores.offers.clone(), recorder.clone())),
        billing: Arc::new(Billing::new(stores.ledger.clone(), recorder)),
        idempotency: stores.idempotency.clone(),
    };
    let app = build_app(ops, api::routes(state), &server_config, Some(ApiDoc::openapi()));
    serve(app, server_config.port, shutdown_token()).await
}
