// Database rows (internal, converted into autoads-core entities)

use autoads_core::ads::{BulkOperation, DeadLetter, Snapshot, UserAdsConnection};
use autoads_core::brand::{BrandProfile, Coverage, CoverageResult};
use autoads_core::console::{ConfigEntry, Subscription, TokenBalance, UserRecord};
use autoads_core::notification::Notification;
use autoads_core::offer::Offer;
use autoads_core::records::EventRecord;
use autoads_core::siterank::{Analysis, DomainCacheEntry};
use autoads_core::StoreResult;
use chrono::{DateTime, Utc};
use sqlx::types::JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::parse_column;

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: String,
    pub event_name: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub user_id: Option<String>,
    pub payload: JsonValue,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            event_name: row.event_name,
            aggregate_type: row.aggregate_type,
            aggregate_id: row.aggregate_id,
            user_id: row.user_id,
            payload: row.payload,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ConnectionRow {
    pub user_id: String,
    pub login_customer_id: Option<String>,
    pub primary_customer_id: Option<String>,
    pub refresh_token: String,
    pub updated_at: DateTime<Utc>,
}

impl From<ConnectionRow> for UserAdsConnection {
    fn from(row: ConnectionRow) -> Self {
        Self {
            user_id: row.user_id,
            login_customer_id: row.login_customer_id,
            primary_customer_id: row.primary_customer_id,
            refresh_token: row.refresh_token,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BulkActionRow {
    pub id: Uuid,
    pub user_id: String,
    pub status: String,
    pub validate_only: bool,
    pub actions: JsonValue,
    pub summary: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BulkActionRow {
    pub fn into_operation(self) -> StoreResult<BulkOperation> {
        Ok(BulkOperation {
            id: self.id,
            user_id: self.user_id,
            status: parse_column(&self.status)?,
            validate_only: self.validate_only,
            actions: serde_json::from_value(self.actions)?,
            summary: self.summary,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SnapshotRow {
    pub id: Uuid,
    pub operation_id: Uuid,
    pub action_index: i32,
    pub phase: String,
    pub data: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl SnapshotRow {
    pub fn into_snapshot(self) -> StoreResult<Snapshot> {
        Ok(Snapshot {
            id: self.id,
            operation_id: self.operation_id,
            action_index: self.action_index,
            phase: parse_column(&self.phase)?,
            data: self.data,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DeadLetterRow {
    pub id: Uuid,
    pub operation_id: Uuid,
    pub action_index: i32,
    pub action_type: String,
    pub customer_id: String,
    pub operation: JsonValue,
    pub error: String,
    pub retry_count: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeadLetterRow {
    pub fn into_dead_letter(self) -> StoreResult<DeadLetter> {
        Ok(DeadLetter {
            id: self.id,
            operation_id: self.operation_id,
            action_index: self.action_index,
            action_type: parse_column(&self.action_type)?,
            customer_id: self.customer_id,
            operation: self.operation,
            error: self.error,
            retry_count: self.retry_count,
            status: parse_column(&self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OfferRow {
    pub id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub url: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<OfferRow> for Offer {
    fn from(row: OfferRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            url: row.url,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AnalysisRow {
    pub id: Uuid,
    pub user_id: String,
    pub offer_id: String,
    pub status: String,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisRow {
    pub fn into_analysis(self) -> StoreResult<Analysis> {
        Ok(Analysis {
            id: self.id,
            user_id: self.user_id,
            offer_id: self.offer_id,
            status: parse_column(&self.status)?,
            result: self.result,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DomainCacheRow {
    pub host: String,
    pub payload: JsonValue,
    pub ok: bool,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<DomainCacheRow> for DomainCacheEntry {
    fn from(row: DomainCacheRow) -> Self {
        Self {
            host: row.host,
            payload: row.payload,
            ok: row.ok,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BrandProfileRow {
    pub seed_domain: String,
    pub aliases: JsonValue,
    pub updated_at: DateTime<Utc>,
}

impl BrandProfileRow {
    pub fn into_profile(self) -> StoreResult<BrandProfile> {
        Ok(BrandProfile {
            seed_domain: self.seed_domain,
            aliases: serde_json::from_value(self.aliases)?,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CoverageRow {
    pub seed_domain: String,
    pub account_id: String,
    pub total_keywords: i64,
    pub brand_keywords: i64,
    pub coverage_ratio: f64,
    pub missing_aliases: JsonValue,
    pub updated_at: DateTime<Utc>,
}

impl CoverageRow {
    pub fn into_result(self) -> StoreResult<CoverageResult> {
        Ok(CoverageResult {
            seed_domain: self.seed_domain,
            account_id: self.account_id,
            coverage: Coverage {
                total_keywords: self.total_keywords,
                brand_keywords: self.brand_keywords,
                coverage_ratio: self.coverage_ratio,
                missing_aliases: serde_json::from_value(self.missing_aliases)?,
            },
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub id: i64,
    pub user_id: String,
    #[sqlx(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl NotificationRow {
    pub fn into_notification(self) -> StoreResult<Notification> {
        Ok(Notification {
            id: self.id,
            user_id: self.user_id,
            notification_type: self.notification_type,
            title: self.title,
            message: serde_json::from_value(self.message)?,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub fn into_user(self) -> StoreResult<UserRecord> {
        Ok(UserRecord {
            id: self.id,
            email: self.email,
            name: self.name,
            role: parse_column(&self.role)?,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TokenBalanceRow {
    pub user_id: String,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<TokenBalanceRow> for TokenBalance {
    fn from(row: TokenBalanceRow) -> Self {
        Self {
            user_id: row.user_id,
            balance: row.balance,
            updated_at: Some(row.updated_at),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRow {
    pub user_id: String,
    pub plan: String,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            user_id: row.user_id,
            plan: row.plan,
            status: row.status,
            current_period_end: row.current_period_end,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ConfigRow {
    pub key: String,
    pub value: JsonValue,
    pub updated_at: DateTime<Utc>,
}

impl From<ConfigRow> for ConfigEntry {
    fn from(row: ConfigRow) -> Self {
        Self {
            key: row.key,
            value: row.value,
            updated_at: row.updated_at,
        }
    }
}
