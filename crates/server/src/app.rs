// Service bootstrap
//
// build_app wraps a service's API routes with the shared surface: health and
// metrics routes, unified 404/405 bodies, request ids, HTTP metrics, tracing,
// optional CORS and the Swagger UI.

use std::sync::Arc;

use anyhow::{Context, Result};
use autoads_core::telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard};
use autoads_core::Readiness;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::{middleware, Router};
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiError;
use crate::health::{self, OpsState};
use crate::metrics::{track_metrics, HttpMetrics};
use crate::request_id::request_id;

pub const DEFAULT_PORT: u16 = 8080;

/// Listener and routing settings shared by every service
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub api_prefix: String,
    pub cors_origins: Vec<HeaderValue>,
    pub run_migrations: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            api_prefix: String::new(),
            cors_origins: Vec::new(),
            run_migrations: false,
        }
    }
}

impl ServerConfig {
    /// `PORT`, `API_PREFIX`, `CORS_ALLOWED_ORIGINS` (CSV), `RUN_MIGRATIONS`
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            api_prefix: std::env::var("API_PREFIX")
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
            cors_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.split(',').filter_map(|o| o.trim().parse().ok()).collect())
                .unwrap_or_default(),
            run_migrations: std::env::var("RUN_MIGRATIONS")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
        }
    }
}

/// Load `.env` and start logging/tracing for a service binary
pub fn init_service(service: &str) -> TelemetryGuard {
    let _ = dotenvy::dotenv();
    init_telemetry(TelemetryConfig::from_env(service))
}

/// Operational state with a fresh metrics registry
pub fn ops_state(service: &'static str, readiness: Option<Arc<dyn Readiness>>) -> Result<OpsState> {
    let metrics = HttpMetrics::new(Registry::new()).context("Failed to register HTTP metrics")?;
    Ok(OpsState {
        service,
        metrics: Arc::new(metrics),
        readiness,
    })
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

async fn method_not_allowed() -> ApiError {
    ApiError::new(autoads_core::ErrorCode::MethodNotAllowed, "Method not allowed")
}

/// Build router with optional API prefix
pub fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}

pub fn build_app(
    ops: OpsState,
    api_routes: Router,
    config: &ServerConfig,
    openapi: Option<utoipa::openapi::OpenApi>,
) -> Router {
    let metrics = ops.metrics.clone();
    let mut app = Router::new()
        .merge(health::routes(ops))
        .merge(build_router_with_prefix(api_routes, &config.api_prefix));

    if let Some(doc) = openapi {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", doc));
    }

    let app = app
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(middleware::from_fn_with_state(metrics, track_metrics));

    let app = if config.cors_origins.is_empty() {
        app
    } else {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(config.cors_origins.clone()))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::AUTHORIZATION,
                    header::ACCEPT,
                    HeaderName::from_static("x-idempotency-key"),
                    HeaderName::from_static("x-request-id"),
                ])
                .allow_credentials(true),
        )
    };

    app.layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id))
}

/// Token cancelled on Ctrl-C or SIGTERM
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
        tracing::info!("Shutdown signal received");
        trigger.cancel();
    });
    token
}

/// Serve until the token is cancelled
pub async fn serve(app: Router, port: u16, shutdown: CancellationToken) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Server error")?;
    Ok(())
}
