// Console services

pub mod accounts;
pub mod adscenter;
pub mod export;
pub mod health;
pub mod limits;
pub mod slo;

pub use accounts::AccountAdmin;
pub use adscenter::{AdscenterProxy, Relayed};
pub use export::events_csv;
pub use health::{HealthProber, HealthReport};
pub use limits::{LimitsPolicy, LimitsPolicyStore};
pub use slo::{SloCollector, SloReport};

/// Envelope source of console-issued events
pub const EVENT_SOURCE: &str = "console";
