// AutoAds Adscenter
// Decision: Library plus thin binaries so the router and services are testable in-process

// Google Ads clients (live, stub, throttled) and the OAuth token client
pub mod ads;

// HTTP routes
pub mod api;

pub mod config;
pub mod error;

// OpenAPI spec generation
pub mod openapi;

// Services layer
pub mod services;

pub use config::AdscenterConfig;
pub use error::{ServiceError, ServiceResult};
