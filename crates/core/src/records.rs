// Event store and projection rows

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::Envelope;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Upper bound of `sinceHours` accepted by event queries (90 days)
pub const MAX_SINCE_HOURS: i64 = 90 * 24;

/// Append-only record of an emitted envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: String,
    pub event_name: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn from_envelope(envelope: &Envelope, idempotency_key: Option<&str>) -> Self {
        Self {
            id: envelope.id.clone(),
            event_name: envelope.event_type.clone(),
            aggregate_type: envelope.aggregate_type().to_string(),
            aggregate_id: envelope.aggregate_id(),
            user_id: envelope.user_id(),
            payload: serde_json::to_value(envelope).unwrap_or(Value::Null),
            idempotency_key: idempotency_key.map(str::to_string),
            created_at: envelope.time,
        }
    }
}

/// Filters for event store queries. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub event_name: Option<String>,
    pub aggregate_type: Option<String>,
    pub aggregate_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: i64,
}

impl EventFilter {
    /// `since` from a `sinceHours` value, capped at 90 days
    pub fn since_hours(mut self, hours: Option<i64>) -> Self {
        self.since = hours
            .filter(|h| *h > 0)
            .map(|h| Utc::now() - Duration::hours(h.min(MAX_SINCE_HOURS)));
        self
    }

    pub fn matches(&self, record: &EventRecord) -> bool {
        self.event_name
            .as_ref()
            .map_or(true, |n| n == &record.event_name)
            && self
                .aggregate_type
                .as_ref()
                .map_or(true, |t| t == &record.aggregate_type)
            && self
                .aggregate_id
                .as_ref()
                .map_or(true, |id| id == &record.aggregate_id)
            && self.since.map_or(true, |since| record.created_at >= since)
    }
}

/// Row written once per projected event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventProjection {
    pub event_id: String,
    pub event_name: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub processed_at: DateTime<Utc>,
}

impl EventProjection {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            event_id: envelope.id.clone(),
            event_name: envelope.event_type.clone(),
            aggregate_type: envelope.aggregate_type().to_string(),
            aggregate_id: envelope.aggregate_id(),
            processed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{OfferCreatedData, OFFER_CREATED};
    use serde_json::Map;

    fn offer_envelope() -> Envelope {
        Envelope::new(
            "offers",
            OfferCreatedData {
                offer_id: "o1".into(),
                user_id: "u1".into(),
                url: "https://foo.com".into(),
                name: None,
                extra: Map::new(),
            },
        )
    }

    #[test]
    fn test_record_from_envelope() {
        let env = offer_envelope();
        let record = EventRecord::from_envelope(&env, Some("k1"));
        assert_eq!(record.event_name, OFFER_CREATED);
        assert_eq!(record.aggregate_type, "offer");
        assert_eq!(record.aggregate_id, "o1");
        assert_eq!(record.user_id.as_deref(), Some("u1"));
        assert_eq!(record.payload["type"], OFFER_CREATED);
        assert_eq!(record.idempotency_key.as_deref(), Some("k1"));
    }

    #[test]
    fn test_filter_matching() {
        let record = EventRecord::from_envelope(&offer_envelope(), None);
        assert!(EventFilter::default().matches(&record));
        let by_name = EventFilter {
            event_name: Some("SiterankCompleted".into()),
            ..Default::default()
        };
        assert!(!by_name.matches(&record));
        let recent = EventFilter::default().since_hours(Some(1));
        assert!(recent.matches(&record));
    }

    #[test]
    fn test_since_hours_capped() {
        let filter = EventFilter::default().since_hours(Some(100_000));
        let since = filter.since.unwrap();
        let span = Utc::now() - since;
        assert!(span <= Duration::hours(MAX_SINCE_HOURS) + Duration::seconds(5));
        assert!(EventFilter::default().since_hours(Some(0)).since.is_none());
    }
}
