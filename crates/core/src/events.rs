// Event Protocol
//
// This module defines the versioned envelope carried on the shared event bus.
// Every envelope has the same shape: specVersion, id, source, type, subject,
// time, data. State-changing handlers append it to the event store and then
// publish it; subscribers must dedupe on `id`.
//
// Decision: The wire payload stays a JSON value; typed access goes through EventData
// Decision: Unknown event names and unknown payload fields are preserved verbatim
// Decision: Envelope ids are UUID v7 so the event store sorts by creation time

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Envelope schema version. Fixed.
pub const SPEC_VERSION: &str = "1.0";

// ============================================================================
// Event Name Constants
// ============================================================================

pub const USER_REGISTERED: &str = "UserRegistered";
pub const OFFER_CREATED: &str = "OfferCreated";

pub const SITERANK_REQUESTED: &str = "SiterankRequested";
pub const SITERANK_COMPLETED: &str = "SiterankCompleted";

pub const BATCH_OPS_TASK_QUEUED: &str = "BatchOpsTaskQueued";
pub const BATCH_OPS_TASK_STARTED: &str = "BatchOpsTaskStarted";
pub const BATCH_OPS_TASK_COMPLETED: &str = "BatchOpsTaskCompleted";
pub const BATCH_OPS_TASK_FAILED: &str = "BatchOpsTaskFailed";

pub const BROWSER_EXEC_REQUESTED: &str = "BrowserExecRequested";
pub const BROWSER_EXEC_COMPLETED: &str = "BrowserExecCompleted";

pub const TOKEN_RESERVED: &str = "TokenReserved";
pub const TOKEN_DEBITED: &str = "TokenDebited";
pub const TOKEN_REVERTED: &str = "TokenReverted";

pub const WORKFLOW_STARTED: &str = "WorkflowStarted";
pub const WORKFLOW_STEP_COMPLETED: &str = "WorkflowStepCompleted";
pub const WORKFLOW_COMPLETED: &str = "WorkflowCompleted";

pub const NOTIFICATION_CREATED: &str = "NotificationCreated";
pub const NOTIFICATION_SENT: &str = "NotificationSent";

// Console-issued; outside the standard set, carried as EventData::Other
pub const TOKEN_GRANTED: &str = "TokenGranted";
pub const SUBSCRIPTION_UPDATED: &str = "SubscriptionUpdated";

/// Event type used when a raw message carries no `eventType` attribute
pub const UNKNOWN: &str = "Unknown";

/// The fixed set of standard event names
pub const STANDARD_EVENT_NAMES: [&str; 18] = [
    USER_REGISTERED,
    OFFER_CREATED,
    SITERANK_REQUESTED,
    SITERANK_COMPLETED,
    BATCH_OPS_TASK_QUEUED,
    BATCH_OPS_TASK_STARTED,
    BATCH_OPS_TASK_COMPLETED,
    BATCH_OPS_TASK_FAILED,
    BROWSER_EXEC_REQUESTED,
    BROWSER_EXEC_COMPLETED,
    TOKEN_RESERVED,
    TOKEN_DEBITED,
    TOKEN_REVERTED,
    WORKFLOW_STARTED,
    WORKFLOW_STEP_COMPLETED,
    WORKFLOW_COMPLETED,
    NOTIFICATION_CREATED,
    NOTIFICATION_SENT,
];

pub fn is_standard_event(name: &str) -> bool {
    STANDARD_EVENT_NAMES.contains(&name)
}

/// Message attribute names mirrored from the envelope
pub mod attributes {
    pub const EVENT_TYPE: &str = "eventType";
    pub const SPEC_VERSION: &str = "specVersion";
    pub const IDEMPOTENCY_KEY: &str = "idempotencyKey";
    pub const SOURCE: &str = "source";
    pub const SUBJECT: &str = "subject";
}

// ============================================================================
// Event Payloads
// ============================================================================

/// Data for UserRegistered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegisteredData {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Data for OfferCreated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferCreatedData {
    pub offer_id: String,
    pub user_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Data for SiterankRequested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiterankRequestedData {
    pub analysis_id: String,
    pub offer_id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Data for SiterankCompleted (emitted for both outcomes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiterankCompletedData {
    pub analysis_id: String,
    pub offer_id: String,
    pub user_id: String,
    pub status: String,
    #[serde(default)]
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Data shared by the BatchOpsTask* lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOpsTaskData {
    pub operation_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Data shared by BrowserExecRequested / BrowserExecCompleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserExecData {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Data shared by TokenReserved / TokenDebited / TokenReverted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenData {
    pub user_id: String,
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Data shared by the Workflow* events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowData {
    pub workflow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Data shared by NotificationCreated / NotificationSent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub notification_id: String,
    pub user_id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub notification_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// EventData Enum - Typed event payloads
// ============================================================================

/// Typed event data, one variant per standard event name.
///
/// `Other` carries events whose name is not standard, or whose payload did not
/// match the expected shape, so projectors can still pass them through.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    UserRegistered(UserRegisteredData),
    OfferCreated(OfferCreatedData),
    SiterankRequested(SiterankRequestedData),
    SiterankCompleted(SiterankCompletedData),
    BatchOpsTaskQueued(BatchOpsTaskData),
    BatchOpsTaskStarted(BatchOpsTaskData),
    BatchOpsTaskCompleted(BatchOpsTaskData),
    BatchOpsTaskFailed(BatchOpsTaskData),
    BrowserExecRequested(BrowserExecData),
    BrowserExecCompleted(BrowserExecData),
    TokenReserved(TokenData),
    TokenDebited(TokenData),
    TokenReverted(TokenData),
    WorkflowStarted(WorkflowData),
    WorkflowStepCompleted(WorkflowData),
    WorkflowCompleted(WorkflowData),
    NotificationCreated(NotificationData),
    NotificationSent(NotificationData),
    Other { event_type: String, data: Value },
}

fn typed<T, F>(event_type: &str, data: Value, wrap: F) -> EventData
where
    T: serde::de::DeserializeOwned,
    F: FnOnce(T) -> EventData,
{
    match serde_json::from_value::<T>(data.clone()) {
        Ok(payload) => wrap(payload),
        Err(e) => {
            tracing::debug!(event_type, error = %e, "payload does not match typed schema, keeping raw");
            EventData::Other {
                event_type: event_type.to_string(),
                data,
            }
        }
    }
}

impl EventData {
    /// Get the event name for this data
    pub fn event_type(&self) -> &str {
        match self {
            EventData::UserRegistered(_) => USER_REGISTERED,
            EventData::OfferCreated(_) => OFFER_CREATED,
            EventData::SiterankRequested(_) => SITERANK_REQUESTED,
            EventData::SiterankCompleted(_) => SITERANK_COMPLETED,
            EventData::BatchOpsTaskQueued(_) => BATCH_OPS_TASK_QUEUED,
            EventData::BatchOpsTaskStarted(_) => BATCH_OPS_TASK_STARTED,
            EventData::BatchOpsTaskCompleted(_) => BATCH_OPS_TASK_COMPLETED,
            EventData::BatchOpsTaskFailed(_) => BATCH_OPS_TASK_FAILED,
            EventData::BrowserExecRequested(_) => BROWSER_EXEC_REQUESTED,
            EventData::BrowserExecCompleted(_) => BROWSER_EXEC_COMPLETED,
            EventData::TokenReserved(_) => TOKEN_RESERVED,
            EventData::TokenDebited(_) => TOKEN_DEBITED,
            EventData::TokenReverted(_) => TOKEN_REVERTED,
            EventData::WorkflowStarted(_) => WORKFLOW_STARTED,
            EventData::WorkflowStepCompleted(_) => WORKFLOW_STEP_COMPLETED,
            EventData::WorkflowCompleted(_) => WORKFLOW_COMPLETED,
            EventData::NotificationCreated(_) => NOTIFICATION_CREATED,
            EventData::NotificationSent(_) => NOTIFICATION_SENT,
            EventData::Other { event_type, .. } => event_type,
        }
    }

    /// Rebuild typed data from an event name and its JSON payload
    pub fn from_parts(event_type: &str, data: Value) -> Self {
        match event_type {
            USER_REGISTERED => typed(event_type, data, EventData::UserRegistered),
            OFFER_CREATED => typed(event_type, data, EventData::OfferCreated),
            SITERANK_REQUESTED => typed(event_type, data, EventData::SiterankRequested),
            SITERANK_COMPLETED => typed(event_type, data, EventData::SiterankCompleted),
            BATCH_OPS_TASK_QUEUED => typed(event_type, data, EventData::BatchOpsTaskQueued),
            BATCH_OPS_TASK_STARTED => typed(event_type, data, EventData::BatchOpsTaskStarted),
            BATCH_OPS_TASK_COMPLETED => typed(event_type, data, EventData::BatchOpsTaskCompleted),
            BATCH_OPS_TASK_FAILED => typed(event_type, data, EventData::BatchOpsTaskFailed),
            BROWSER_EXEC_REQUESTED => typed(event_type, data, EventData::BrowserExecRequested),
            BROWSER_EXEC_COMPLETED => typed(event_type, data, EventData::BrowserExecCompleted),
            TOKEN_RESERVED => typed(event_type, data, EventData::TokenReserved),
            TOKEN_DEBITED => typed(event_type, data, EventData::TokenDebited),
            TOKEN_REVERTED => typed(event_type, data, EventData::TokenReverted),
            WORKFLOW_STARTED => typed(event_type, data, EventData::WorkflowStarted),
            WORKFLOW_STEP_COMPLETED => typed(event_type, data, EventData::WorkflowStepCompleted),
            WORKFLOW_COMPLETED => typed(event_type, data, EventData::WorkflowCompleted),
            NOTIFICATION_CREATED => typed(event_type, data, EventData::NotificationCreated),
            NOTIFICATION_SENT => typed(event_type, data, EventData::NotificationSent),
            other => EventData::Other {
                event_type: other.to_string(),
                data,
            },
        }
    }

    /// Serialize the payload to its wire JSON
    pub fn to_value(&self) -> Value {
        let result = match self {
            EventData::UserRegistered(d) => serde_json::to_value(d),
            EventData::OfferCreated(d) => serde_json::to_value(d),
            EventData::SiterankRequested(d) => serde_json::to_value(d),
            EventData::SiterankCompleted(d) => serde_json::to_value(d),
            EventData::BatchOpsTaskQueued(d)
            | EventData::BatchOpsTaskStarted(d)
            | EventData::BatchOpsTaskCompleted(d)
            | EventData::BatchOpsTaskFailed(d) => serde_json::to_value(d),
            EventData::BrowserExecRequested(d) | EventData::BrowserExecCompleted(d) => {
                serde_json::to_value(d)
            }
            EventData::TokenReserved(d)
            | EventData::TokenDebited(d)
            | EventData::TokenReverted(d) => serde_json::to_value(d),
            EventData::WorkflowStarted(d)
            | EventData::WorkflowStepCompleted(d)
            | EventData::WorkflowCompleted(d) => serde_json::to_value(d),
            EventData::NotificationCreated(d) | EventData::NotificationSent(d) => {
                serde_json::to_value(d)
            }
            EventData::Other { data, .. } => Ok(data.clone()),
        };
        // Payload structs only hold strings, numbers and JSON values
        result.unwrap_or(Value::Null)
    }
}

impl From<UserRegisteredData> for EventData {
    fn from(data: UserRegisteredData) -> Self {
        EventData::UserRegistered(data)
    }
}

impl From<OfferCreatedData> for EventData {
    fn from(data: OfferCreatedData) -> Self {
        EventData::OfferCreated(data)
    }
}

impl From<SiterankRequestedData> for EventData {
    fn from(data: SiterankRequestedData) -> Self {
        EventData::SiterankRequested(data)
    }
}

impl From<SiterankCompletedData> for EventData {
    fn from(data: SiterankCompletedData) -> Self {
        EventData::SiterankCompleted(data)
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Versioned carrier for a domain event on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub spec_version: String,
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Create an envelope for the given typed data.
    /// The event type is inferred from the data.
    pub fn new(source: impl Into<String>, data: impl Into<EventData>) -> Self {
        let data = data.into();
        Self {
            spec_version: SPEC_VERSION.to_string(),
            id: Uuid::now_v7().to_string(),
            source: source.into(),
            event_type: data.event_type().to_string(),
            subject: None,
            time: Utc::now(),
            data: data.to_value(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Typed view of the payload
    pub fn event(&self) -> EventData {
        EventData::from_parts(&self.event_type, self.data.clone())
    }

    /// Attribute map sent alongside the message body
    pub fn attributes(&self, idempotency_key: Option<&str>) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert(attributes::EVENT_TYPE.to_string(), self.event_type.clone());
        attrs.insert(
            attributes::SPEC_VERSION.to_string(),
            self.spec_version.clone(),
        );
        if !self.source.is_empty() {
            attrs.insert(attributes::SOURCE.to_string(), self.source.clone());
        }
        if let Some(subject) = &self.subject {
            attrs.insert(attributes::SUBJECT.to_string(), subject.clone());
        }
        if let Some(key) = idempotency_key {
            attrs.insert(attributes::IDEMPOTENCY_KEY.to_string(), key.to_string());
        }
        attrs
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a bus message. Payloads that are not an envelope are wrapped,
    /// using the attributes as metadata.
    pub fn from_message(
        payload: &[u8],
        attrs: &HashMap<String, String>,
        message_id: Option<&str>,
    ) -> Self {
        if let Ok(envelope) = serde_json::from_slice::<Envelope>(payload) {
            if !envelope.id.is_empty() && !envelope.event_type.is_empty() {
                return envelope;
            }
        }

        let data = serde_json::from_slice::<Value>(payload)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()));

        Self {
            spec_version: attrs
                .get(attributes::SPEC_VERSION)
                .cloned()
                .unwrap_or_else(|| SPEC_VERSION.to_string()),
            id: message_id
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::now_v7().to_string()),
            source: attrs.get(attributes::SOURCE).cloned().unwrap_or_default(),
            event_type: attrs
                .get(attributes::EVENT_TYPE)
                .cloned()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            subject: attrs.get(attributes::SUBJECT).cloned(),
            time: Utc::now(),
            data,
        }
    }

    /// `userId` carried in the payload, if any
    pub fn user_id(&self) -> Option<String> {
        self.data
            .get("userId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Aggregate type derived from the event name family
    pub fn aggregate_type(&self) -> &'static str {
        aggregate_type_for(&self.event_type)
    }

    /// Aggregate id: subject first, then the well-known id fields, then the event id
    pub fn aggregate_id(&self) -> String {
        if let Some(subject) = self.subject.as_ref().filter(|s| !s.is_empty()) {
            return subject.clone();
        }
        const ID_FIELDS: [&str; 8] = [
            "analysisId",
            "operationId",
            "offerId",
            "taskId",
            "workflowId",
            "notificationId",
            "reservationId",
            "userId",
        ];
        ID_FIELDS
            .iter()
            .find_map(|field| match self.data.get(*field) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| self.id.clone())
    }
}

/// Map an event name to the aggregate it belongs to
pub fn aggregate_type_for(event_type: &str) -> &'static str {
    if event_type == USER_REGISTERED {
        "user"
    } else if event_type == OFFER_CREATED {
        "offer"
    } else if event_type.starts_with("Siterank") {
        "siterank_analysis"
    } else if event_type.starts_with("BatchOps") {
        "bulk_action"
    } else if event_type.starts_with("BrowserExec") {
        "browser_task"
    } else if event_type.starts_with("Token") {
        "token"
    } else if event_type.starts_with("Workflow") {
        "workflow"
    } else if event_type.starts_with("Notification") {
        "notification"
    } else if event_type.starts_with("Subscription") {
        "subscription"
    } else {
        "unknown"
    }
}

// ============================================================================
// Tests
// ============================================================================
