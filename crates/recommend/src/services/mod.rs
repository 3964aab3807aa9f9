// Services layer

pub mod aliases;
pub mod engine;

pub use aliases::AliasService;
pub use engine::{AuditJob, BrandCheck, BrandEngine, PlannedCoverage};
