// Postgres storage layer with sqlx
//
// This crate provides database implementations for the core store traits.
// Every trait is implemented on the single `Database` handle:
// - event_store: EventStore, ProjectionStore, IdempotencyStore
// - adscenter_store: ConnectionStore, BulkActionStore
// - siterank_store: OfferStore, AnalysisStore, DomainCacheStore
// - brand_store: BrandStore
// - notification_store: NotificationStore
// - console_store: ConsoleStore, TokenLedger, PlanResolver
//
// Refresh tokens never reach a row unencrypted: see cipher and custody.

pub mod cipher;
pub mod custody;
pub mod database;
pub mod models;
pub mod stores;

mod adscenter_store;
mod brand_store;
mod console_store;
mod event_store;
mod notification_store;
mod siterank_store;

pub use cipher::{generate_key, CipherError, Decrypted, KeyUsed, TokenCipher};
pub use custody::{migrate_refresh_tokens, CustodyError, MigrationReport, RefreshTokenVault};
pub use database::Database;
pub use stores::Stores;
