// AutoAds Console
// Decision: The console owns no tables of its own besides console_config; everything else is read through shared stores or upstream HTTP

// HTTP routes
pub mod api;

pub mod config;
pub mod error;

// OpenAPI spec generation
pub mod openapi;

// Services layer
pub mod services;

pub use config::ConsoleConfig;
pub use error::{ServiceError, ServiceResult};
