// AutoAds Recommend
// Decision: Library plus a thin binary so the engine is testable in-process

// HTTP routes
pub mod api;

pub mod config;
pub mod error;

// OpenAPI spec generation
pub mod openapi;

// Alias service and brand engine
pub mod services;

// Landing-page signal fetcher
pub mod signals;

pub use config::RecommendConfig;
pub use error::{ServiceError, ServiceResult};
