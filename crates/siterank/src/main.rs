// Siterank API server

use std::sync::Arc;

use anyhow::{Context, Result};
use autoads_cloud::{publisher_from_env, secrets_from_env, subscriber_from_env};
use autoads_core::EventRecorder;
use autoads_server::metrics::register_histogram;
use autoads_server::{build_app, init_service, ops_state, serve, shutdown_token, AuthConfig, ServerConfig};
use autoads_siterank::api::{self, AppState};
use autoads_siterank::config::SiterankConfig;
use autoads_siterank::openapi::ApiDoc;
use autoads_siterank::services::{Analyzer, DomainCache, OfferCreatedHandler};
use autoads_siterank::traffic::{SimilarWebClient, TrafficSource};
use autoads_storage::Stores;
use utoipa::OpenApi;

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_service("siterank");

    let server_config = ServerConfig::from_env();
    let secrets = secrets_from_env();
    let config = SiterankConfig::load(secrets.as_deref())
        .await
        .context("Failed to load siterank configuration")?;

    let database_url = std::env::var("DATABASE_URL").ok();
    let stores = Stores::connect(database_url.as_deref(), server_config.run_migrations).await?;
    let recorder = EventRecorder::new(stores.events.clone(), publisher_from_env());
    let ops = ops_state("siterank", Some(stores.readiness.clone()))?;

    let source: Option<Arc<dyn TrafficSource>> = match &config.similarweb_base_url {
        Some(template) => {
            let fetch_duration = register_histogram(
                ops.metrics.registry(),
                "sw_fetch_duration_seconds",
                "Latency of upstream traffic fetches",
                &["outcome"],
            )?;
            tracing::info!(timeout_ms = config.fetch_timeout.as_millis() as u64, "Traffic upstream configured");
            Some(Arc::new(
                SimilarWebClient::new(template, config.fetch_timeout).with_histogram(fetch_duration),
            ))
        }
        None => {
            tracing::warn!("SIMILARWEB_BASE_URL not set, analyses without a cached host will fail");
            None
        }
    };

    let analyzer = Arc::new(Analyzer::new(
        stores.analyses.clone(),
        stores.offers.clone(),
        DomainCache::new(stores.domains.clone()),
        source,
        recorder,
        config.retry.clone(),
    ));

    let shutdown = shutdown_token();
    if let Some(subscriber) = subscriber_from_env() {
        let handler = Arc::new(OfferCreatedHandler::new(analyzer.clone()));
        tokio::spawn(subscriber.run(handler, shutdown.clone()));
    }

    let state = AppState {
        auth: Arc::new(AuthConfig::from_env()),
        analyzer,
        idempotency: stores.idempotency.clone(),
    };
    let app = build_app(ops, api::routes(state), &server_config, Some(ApiDoc::openapi()));

    serve(app, server_config.port, shutdown).await
}
