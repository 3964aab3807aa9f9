// Recommend API server

use std::sync::Arc;

use anyhow::Result;
use autoads_cloud::BigQueryWarehouse;
use autoads_core::KeywordWarehouse;
use autoads_recommend::api::{self, AppState};
use autoads_recommend::config::RecommendConfig;
use autoads_recommend::openapi::ApiDoc;
use autoads_recommend::services::{AliasService, BrandEngine};
use autoads_recommend::signals::SignalFetcher;
use autoads_server::{build_app, init_service, ops_state, serve, shutdown_token, AuthConfig, ServerConfig};
use autoads_storage::Stores;
use utoipa::OpenApi;

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_service("recommend");

    let server_config = ServerConfig::from_env();
    let config = RecommendConfig::from_env();

    let database_url = std::env::var("DATABASE_URL").ok();
    let stores = Stores::connect(database_url.as_deref(), server_config.run_migrations).await?;
    let ops = ops_state("recommend", Some(stores.readiness.clone()))?;

    let mut signals = SignalFetcher::new(config.signals_timeout, config.signals_max_bytes);
    if let Some(url) = &config.browser_exec_url {
        tracing::info!("Landing signals via browser executor");
        signals = signals.with_browser(url, config.browser_token.clone());
    }
    let aliases = AliasService::new(stores.brands.clone(), signals, config.alias_cache_ttl);

    let warehouse: Option<Arc<dyn KeywordWarehouse>> = match BigQueryWarehouse::from_env() {
        Some(warehouse) => Some(Arc::new(warehouse)),
        None => {
            tracing::info!("Keyword warehouse disabled, offline audits need explicit keywords");
            None
        }
    };

    let state = AppState {
        auth: Arc::new(AuthConfig::from_env()),
        engine: Arc::new(BrandEngine::new(aliases, stores.brands.clone(), warehouse)),
    };
    let app = build_app(ops, api::routes(state), &server_config, Some(ApiDoc::openapi()));

    serve(app, server_config.port, shutdown_token()).await
}
