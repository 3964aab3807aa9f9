// Projector server
//
// Push deliveries arrive over HTTP; PUBSUB_SUBSCRIPTION_ID additionally
// starts a pull subscriber feeding the same projector.

use std::sync::Arc;

use anyhow::Result;
use autoads_cloud::{subscriber_from_env, FirestoreDocs};
use autoads_core::UiDocStore;
use autoads_projector::api::{self, AppState};
use autoads_projector::openapi::ApiDoc;
use autoads_projector::Projector;
use autoads_server::{build_app, init_service, ops_state, serve, shutdown_token, ServerConfig};
use autoads_storage::Stores;
use utoipa::OpenApi;

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_service("projector");

    let server_config = ServerConfig::from_env();
    let database_url = std::env::var("DATABASE_URL").ok();
    let stores = Stores::connect(database_url.as_deref(), server_config.run_migrations).await?;
    let ops = ops_state("projector", Some(stores.readiness.clone()))?;

    let docs: Option<Arc<dyn UiDocStore>> = match FirestoreDocs::from_env() {
        Some(docs) => {
            tracing::info!("Mirroring recent events to Firestore");
            Some(Arc::new(docs))
        }
        None => None,
    };
    let projector = Arc::new(Projector::new(stores.projections.clone(), docs));

    let shutdown = shutdown_token();
    if let Some(subscriber) = subscriber_from_env() {
        tokio::spawn(subscriber.run(projector.clone(), shutdown.clone()));
    }

    let app = build_app(ops, api::routes(AppState { projector }), &server_config, Some(ApiDoc::openapi()));
    serve(app, server_config.port, shutdown).await
}
