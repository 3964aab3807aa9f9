// Services layer

pub mod analyzer;
pub mod domain_cache;
pub mod offer_events;

pub use analyzer::Analyzer;
pub use domain_cache::DomainCache;
pub use offer_events::OfferCreatedHandler;
