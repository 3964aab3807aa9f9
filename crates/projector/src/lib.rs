// AutoAds Projector

// HTTP routes
pub mod api;

// OpenAPI spec generation
pub mod openapi;

pub mod projector;

pub use projector::Projector;
