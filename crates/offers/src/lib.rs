// AutoAds Offers
// Decision: Offer intake and token billing share one binary; both are thin event emitters

// HTTP routes
pub mod api;

pub mod error;

// OpenAPI spec generation
pub mod openapi;

// Offer and billing services
pub mod services;

pub use error::{ServiceError, ServiceResult};
