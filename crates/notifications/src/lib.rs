// AutoAds Notifications

// HTTP routes
pub mod api;

// Event to notification mapping
pub mod compose;

pub mod notifier;

// OpenAPI spec generation
pub mod openapi;

pub use notifier::Notifier;
