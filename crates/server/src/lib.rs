// AutoAds HTTP substrate
//
// Shared by every service binary: unified error body, request ids, identity
// extractors, idempotency keys, health/readiness/metrics and server bootstrap.

pub mod app;
pub mod auth;
pub mod error;
pub mod health;
pub mod idempotency;
pub mod json;
pub mod metrics;
pub mod request_id;

pub use app::{build_app, init_service, ops_state, serve, shutdown_token, ServerConfig};
pub use auth::{AdminUser, AuthConfig, AuthUser, Identity};
pub use error::{ApiError, ApiResult, ErrorBody};
pub use health::OpsState;
pub use idempotency::Idempotency;
pub use json::Json;
pub use metrics::HttpMetrics;
pub use request_id::{current_request_id, RequestId};
