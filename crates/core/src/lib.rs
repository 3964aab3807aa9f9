// AutoAds core substrate
//
// This crate holds everything the services share that does not touch a
// database driver or a cloud API directly.
//
// Key design decisions:
// - Event payloads are typed per event name; unknown names and fields pass through
// - Stores are traits (traits.rs); Postgres impls live in autoads-storage
// - In-memory impls of every trait back tests and local development
// - Rate limiting and retry are runtime-only primitives shared by every upstream client
// - Error codes are one taxonomy shared by every HTTP surface

// Envelope and event names
pub mod events;
pub mod records;

pub mod error;
pub mod idempotency;
pub mod ratelimit;
pub mod recorder;
pub mod task;
pub mod traits;

// Domain entity types
pub mod ads;
pub mod brand;
pub mod console;
pub mod notification;
pub mod offer;
pub mod siterank;

// Telemetry (tracing subscriber + optional OTLP export)
pub mod telemetry;

// In-memory implementations for tests and local development
pub mod memory;

// Re-exports for convenience
pub use error::{BusError, ErrorCode, SecretError, StoreError, UpstreamError};
pub use events::{Envelope, EventData};
pub use idempotency::{IdempotencyBinding, IdempotencyKey};
pub use recorder::EventRecorder;
pub use records::{EventFilter, EventProjection, EventRecord};
pub use traits::*;
