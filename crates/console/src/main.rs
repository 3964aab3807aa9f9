// Console API server

use std::sync::Arc;

use anyhow::Result;
use autoads_cloud::{publisher_from_env, secrets_from_env};
use autoads_console::api::{self, AppState};
use autoads_console::openapi::ApiDoc;
use autoads_console::services::{AccountAdmin, AdscenterProxy, HealthProber, LimitsPolicyStore, SloCollector};
use autoads_console::ConsoleConfig;
use autoads_core::{EventRecorder, SecretSource};
use autoads_server::{build_app, init_service, ops_state, serve, shutdown_token, AuthConfig, ServerConfig};
use autoads_storage::Stores;
use utoipa::OpenApi;

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_service("console");

    let server_config = ServerConfig::from_env();
    let config = ConsoleConfig::from_env();
    tracing::info!(
        services = ?config.services.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        adscenter = config.adscenter_url.is_some(),
        "Console configuration loaded"
    );

    let database_url = std::env::var("DATABASE_URL").ok();
    let stores = Stores::connect(database_url.as_deref(), server_config.run_migrations).await?;
    let ops = ops_state("console", Some(stores.readiness.clone()))?;
    let recorder = EventRecorder::new(stores.events.clone(), publisher_from_env());
    let secrets = secrets_from_env().map(|cache| cache as Arc<dyn SecretSource>);

    let state = AppState {
        auth: Arc::new(AuthConfig::from_env()),
        accounts: Arc::new(AccountAdmin::new(stores.console.clone(), stores.ledger.clone(), recorder)),
        console: stores.console.clone(),
        events: stores.events.clone(),
        notifications: stores.notifications.clone(),
        slo: Arc::new(SloCollector::new(config.services.clone(), config.scrape_timeout)),
        health: Arc::new(HealthProber::new(config.services.clone(), config.probe_timeout)),
        limits: Arc::new(LimitsPolicyStore::new(secrets, config.limits_secret.clone())),
        adscenter: Arc::new(AdscenterProxy::new(config.adscenter_url.clone(), stores.bulk.clone())),
    };
    let app = build_app(ops, api::routes(state), &server_config, Some(ApiDoc::openapi()));
    serve(app, server_config.port, shutdown_token()).await
}
