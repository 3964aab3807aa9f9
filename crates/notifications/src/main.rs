// Notifications server

use std::sync::Arc;

use anyhow::Result;
use autoads_cloud::{publisher_from_env, subscriber_from_env};
use autoads_core::EventRecorder;
use autoads_notifications::api::{self, AppState};
use autoads_notifications::openapi::ApiDoc;
use autoads_notifications::Notifier;
use autoads_server::{build_app, init_service, ops_state, serve, shutdown_token, AuthConfig, ServerConfig};
use autoads_storage::Stores;
use utoipa::OpenApi;

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_service("notifications");

    let server_config = ServerConfig::from_env();
    let database_url = std::env::var("DATABASE_URL").ok();
    let stores = Stores::connect(database_url.as_deref(), server_config.run_migrations).await?;
    let ops = ops_state("notifications", Some(stores.readiness.clone()))?;

    let recorder = EventRecorder::new(stores.events.clone(), publisher_from_env());
    let notifier = Arc::new(Notifier::new(
        stores.notifications.clone(),
        stores.idempotency.clone(),
        recorder,
    ));

    let shutdown = shutdown_token();
    if let Some(subscriber) = subscriber_from_env() {
        tokio::spawn(subscriber.run(notifier.clone(), shutdown.clone()));
    }

    let state = AppState {
        auth: Arc::new(AuthConfig::from_env()),
        notifier,
        notifications: stores.notifications.clone(),
    };
    let app = build_app(ops, api::routes(state), &server_config, Some(ApiDoc::openapi()));
    serve(app, server_config.port, shutdown).await
}
