// Core traits for pluggable backends
//
// Services depend on these traits only:
// - PostgreSQL implementations live in autoads-storage
// - Google Cloud implementations live in autoads-cloud
// - In-memory implementations (crate::memory) back tests and local dev

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::ads::{BulkOperation, BulkStatus, DeadLetter, DeadLetterStatus, Snapshot, UserAdsConnection};
use crate::brand::{BrandProfile, CoverageResult, KeywordRisk};
use crate::console::{
    ConfigEntry, ConsoleStats, Role, Subscription, TokenBalance, TokenStats, UserRecord,
};
use crate::error::{BusError, SecretError, StoreError, UpstreamError};
use crate::events::Envelope;
use crate::idempotency::IdempotencyBinding;
use crate::notification::{DailyIncidents, NewNotification, Notification, Severity};
use crate::offer::Offer;
use crate::records::{EventFilter, EventProjection, EventRecord};
use crate::siterank::{Analysis, DomainCacheEntry};

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Event bus
// ============================================================================

/// Publishes envelopes to the shared topic.
/// Returns only after the broker acknowledged the message.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one envelope; returns the broker message id
    async fn publish(
        &self,
        envelope: &Envelope,
        idempotency_key: Option<&str>,
    ) -> Result<String, BusError>;
}

// ============================================================================
// Events and projections
// ============================================================================

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, record: &EventRecord) -> StoreResult<()>;

    /// Newest first, at most `filter.limit` rows
    async fn query(&self, filter: &EventFilter) -> StoreResult<Vec<EventRecord>>;

    async fn get(&self, id: &str) -> StoreResult<Option<EventRecord>>;
}

#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Insert unless a row for the event id exists. Returns true when inserted.
    async fn insert_if_absent(&self, projection: &EventProjection) -> StoreResult<bool>;
}

// ============================================================================
// Idempotency
// ============================================================================

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Target bound to `(key, user_id, scope)`; expired bindings are ignored
    async fn lookup(&self, key: &str, user_id: &str, scope: &str) -> StoreResult<Option<String>>;

    /// Upsert a binding
    async fn bind(&self, binding: &IdempotencyBinding) -> StoreResult<()>;

    /// Delete expired bindings; returns the number removed
    async fn purge_expired(&self) -> StoreResult<u64>;
}

// ============================================================================
// Adscenter
// ============================================================================

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn get_connection(&self, user_id: &str) -> StoreResult<Option<UserAdsConnection>>;

    async fn upsert_connection(&self, connection: &UserAdsConnection) -> StoreResult<()>;

    async fn update_refresh_token(&self, user_id: &str, refresh_token: &str) -> StoreResult<()>;

    /// Page through connections ordered by user id
    async fn list_connections(&self, offset: i64, limit: i64) -> StoreResult<Vec<UserAdsConnection>>;
}

#[async_trait]
pub trait BulkActionStore: Send + Sync {
    async fn create_operation(&self, operation: &BulkOperation) -> StoreResult<()>;

    async fn get_operation(&self, id: Uuid) -> StoreResult<Option<BulkOperation>>;

    async fn update_operation_status(
        &self,
        id: Uuid,
        status: BulkStatus,
        summary: Option<Value>,
    ) -> StoreResult<()>;

    async fn add_snapshot(&self, snapshot: &Snapshot) -> StoreResult<()>;

    async fn list_snapshots(&self, operation_id: Uuid) -> StoreResult<Vec<Snapshot>>;

    async fn add_dead_letter(&self, dead_letter: &DeadLetter) -> StoreResult<()>;

    async fn list_dead_letters(&self, operation_id: Uuid) -> StoreResult<Vec<DeadLetter>>;

    async fn get_dead_letter(&self, operation_id: Uuid, id: Uuid) -> StoreResult<Option<DeadLetter>>;

    /// Record a retry attempt: bump retry_count, set status, replace error when given
    async fn record_dead_letter_retry(
        &self,
        id: Uuid,
        status: DeadLetterStatus,
        error: Option<&str>,
    ) -> StoreResult<()>;
}

// ============================================================================
// Offers and Siterank
// ============================================================================

#[async_trait]
pub trait OfferStore: Send + Sync {
    /// Fails with AlreadyExists when the id is taken
    async fn create_offer(&self, offer: &Offer) -> StoreResult<()>;

    async fn get_offer(&self, id: &str) -> StoreResult<Option<Offer>>;
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Fails with AlreadyExists when the user already has an active analysis for the offer
    async fn create_analysis(&self, analysis: &Analysis) -> StoreResult<()>;

    async fn get_analysis(&self, id: Uuid) -> StoreResult<Option<Analysis>>;

    /// Newest analysis for an offer, optionally restricted to one user
    async fn latest_for_offer(&self, offer_id: &str, user_id: Option<&str>) -> StoreResult<Option<Analysis>>;

    async fn mark_running(&self, id: Uuid) -> StoreResult<()>;

    async fn mark_completed(&self, id: Uuid, result: Value) -> StoreResult<()>;

    async fn mark_failed(&self, id: Uuid, reason: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait DomainCacheStore: Send + Sync {
    async fn get_domain(&self, host: &str) -> StoreResult<Option<DomainCacheEntry>>;

    async fn put_domain(&self, entry: &DomainCacheEntry) -> StoreResult<()>;
}

// ============================================================================
// Recommendations
// ============================================================================

#[async_trait]
pub trait BrandStore: Send + Sync {
    async fn upsert_profile(&self, profile: &BrandProfile) -> StoreResult<()>;

    async fn get_profile(&self, seed_domain: &str) -> StoreResult<Option<BrandProfile>>;

    /// Append keyword results; returns the number of rows written
    async fn insert_results(&self, seed_domain: &str, results: &[KeywordRisk]) -> StoreResult<u64>;

    async fn upsert_coverage(&self, coverage: &CoverageResult) -> StoreResult<()>;

    async fn get_coverage(&self, seed_domain: &str, account_id: &str) -> StoreResult<Option<CoverageResult>>;
}

/// Source of live keywords for offline audits
#[async_trait]
pub trait KeywordWarehouse: Send + Sync {
    /// Distinct keywords seen recently, optionally for one ads account
    async fn recent_keywords(&self, account_id: Option<&str>, limit: usize) -> Result<Vec<String>, UpstreamError>;
}

// ============================================================================
// Notifications and projections
// ============================================================================

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: &NewNotification) -> StoreResult<Notification>;

    /// Newest first; only ids below `cursor` when given
    async fn recent(&self, user_id: &str, limit: i64, cursor: Option<i64>) -> StoreResult<Vec<Notification>>;

    /// Notifications of any user with one of the given severities, newest first
    async fn by_severity(
        &self,
        severities: &[Severity],
        since: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Notification>>;

    /// Per-day warn/error counts since a point in time
    async fn daily_incidents(&self, since: DateTime<Utc>) -> StoreResult<Vec<DailyIncidents>>;
}

/// Key-value document cache used by the UI (recent events per user)
#[async_trait]
pub trait UiDocStore: Send + Sync {
    async fn put_recent_event(&self, user_id: &str, event_id: &str, doc: &Value) -> Result<(), UpstreamError>;
}

// ============================================================================
// Billing and console
// ============================================================================

/// Resolves the billing plan of a user
#[async_trait]
pub trait PlanResolver: Send + Sync {
    /// Plan of the user's active subscription, if any
    async fn plan_for(&self, user_id: &str) -> StoreResult<Option<String>>;
}

#[async_trait]
pub trait TokenLedger: Send + Sync {
    async fn balance(&self, user_id: &str) -> StoreResult<TokenBalance>;

    /// Add `delta` (negative to debit) atomically with a ledger entry and,
    /// when given, the event record. Fails with Conflict when the balance
    /// would go negative.
    async fn apply(
        &self,
        user_id: &str,
        delta: i64,
        kind: &str,
        reason: Option<&str>,
        event: Option<&EventRecord>,
    ) -> StoreResult<TokenBalance>;
}

#[async_trait]
pub trait ConsoleStore: Send + Sync {
    async fn list_users(&self, limit: i64, offset: i64) -> StoreResult<Vec<UserRecord>>;

    async fn get_user(&self, id: &str) -> StoreResult<Option<UserRecord>>;

    /// Fails with NotFound for unknown users
    async fn set_role(&self, id: &str, role: Role) -> StoreResult<UserRecord>;

    async fn get_subscription(&self, user_id: &str) -> StoreResult<Option<Subscription>>;

    /// Upsert; setting status active extends current_period_end by 30 days.
    /// The event record, when given, commits atomically with the row.
    async fn upsert_subscription(
        &self,
        user_id: &str,
        plan: &str,
        status: &str,
        event: Option<&EventRecord>,
    ) -> StoreResult<Subscription>;

    async fn token_stats(&self) -> StoreResult<TokenStats>;

    async fn stats(&self) -> StoreResult<ConsoleStats>;

    async fn get_config(&self, key: &str) -> StoreResult<Option<ConfigEntry>>;

    async fn put_config(&self, key: &str, value: &Value) -> StoreResult<ConfigEntry>;
}

// ============================================================================
// Secrets and readiness
// ============================================================================

#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Latest version of a secret
    async fn access(&self, name: &str) -> Result<String, SecretError>;

    /// Append a new version
    async fn add_version(&self, name: &str, payload: &str) -> Result<(), SecretError>;
}

/// Dependency pinged by `/readyz`
#[async_trait]
pub trait Readiness: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;
}
