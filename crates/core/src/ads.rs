// Adscenter domain entities
//
// User ads connections, bulk operations and their child rows
// (before/after snapshots and dead letters).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Length of a Google Ads customer id
pub const CUSTOMER_ID_LEN: usize = 10;

/// True when `id` is exactly ten ASCII digits
pub fn is_valid_customer_id(id: &str) -> bool {
    id.len() == CUSTOMER_ID_LEN && id.bytes().all(|b| b.is_ascii_digit())
}

/// Strip the `123-456-7890` display dashes and validate
pub fn normalize_customer_id(raw: &str) -> Option<String> {
    let compact: String = raw.trim().chars().filter(|c| *c != '-').collect();
    is_valid_customer_id(&compact).then_some(compact)
}

/// OAuth connection of a user to Google Ads.
/// `refresh_token` holds the ciphertext (or plaintext in legacy mode).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAdsConnection {
    pub user_id: String,
    pub login_customer_id: Option<String>,
    pub primary_customer_id: Option<String>,
    pub refresh_token: String,
    pub updated_at: DateTime<Utc>,
}

/// Bulk action type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    AdjustCpc,
    AdjustBudget,
    RotateLink,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AdjustCpc => "ADJUST_CPC",
            ActionType::AdjustBudget => "ADJUST_BUDGET",
            ActionType::RotateLink => "ROTATE_LINK",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADJUST_CPC" => Ok(ActionType::AdjustCpc),
            "ADJUST_BUDGET" => Ok(ActionType::AdjustBudget),
            "ROTATE_LINK" => Ok(ActionType::RotateLink),
            other => Err(format!("unknown action type: {}", other)),
        }
    }
}

/// One requested action inside a bulk operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct BulkAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub params: Value,
    /// `{resourceNames?, excludeResourceNames?}` narrowing the targets in `params`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub filter: Option<Value>,
}

/// Bulk operation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum BulkStatus {
    Queued,
    Running,
    Completed,
    Partial,
    Failed,
}

impl BulkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkStatus::Queued => "queued",
            BulkStatus::Running => "running",
            BulkStatus::Completed => "completed",
            BulkStatus::Partial => "partial",
            BulkStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for BulkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(BulkStatus::Queued),
            "running" => Ok(BulkStatus::Running),
            "completed" => Ok(BulkStatus::Completed),
            "partial" => Ok(BulkStatus::Partial),
            "failed" => Ok(BulkStatus::Failed),
            other => Err(format!("unknown bulk status: {}", other)),
        }
    }
}

/// Bulk operation aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct BulkOperation {
    pub id: Uuid,
    pub user_id: String,
    pub status: BulkStatus,
    pub validate_only: bool,
    pub actions: Vec<BulkAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub summary: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BulkOperation {
    pub fn new(user_id: impl Into<String>, actions: Vec<BulkAction>, validate_only: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            status: BulkStatus::Queued,
            validate_only,
            actions,
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Snapshot phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SnapshotPhase {
    Before,
    After,
}

impl SnapshotPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotPhase::Before => "before",
            SnapshotPhase::After => "after",
        }
    }
}

impl FromStr for SnapshotPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => Ok(SnapshotPhase::Before),
            "after" => Ok(SnapshotPhase::After),
            other => Err(format!("unknown snapshot phase: {}", other)),
        }
    }
}

/// Structured snapshot: `data` maps resource name → row as returned by searchStream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: Uuid,
    pub operation_id: Uuid,
    pub action_index: i32,
    pub phase: SnapshotPhase,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum DeadLetterStatus {
    Pending,
    Resolved,
}

impl DeadLetterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterStatus::Pending => "pending",
            DeadLetterStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for DeadLetterStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeadLetterStatus::Pending),
            "resolved" => Ok(DeadLetterStatus::Resolved),
            other => Err(format!("unknown dead letter status: {}", other)),
        }
    }
}

/// Failed sub-operation of a bulk action; `operation` is the exact mutate
/// operation that failed so it can be replayed as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub id: Uuid,
    pub operation_id: Uuid,
    pub action_index: i32,
    pub action_type: ActionType,
    pub customer_id: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub operation: Value,
    pub error: String,
    pub retry_count: i32,
    pub status: DeadLetterStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
