// AutoAds Siterank
// Decision: Library plus a thin binary so the pipeline is testable in-process

// HTTP routes
pub mod api;

pub mod config;
pub mod error;

// OpenAPI spec generation
pub mod openapi;

// Analysis pipeline, domain cache and bus consumer
pub mod services;

// Upstream traffic data client
pub mod traffic;

pub use config::SiterankConfig;
pub use error::{ServiceError, ServiceResult};
