// User notifications
//
// The message column is JSON with required severity, category and summary;
// extra fields ride along untouched.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Default page size of the recent list
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Maximum page size of the recent list
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// Structured notification body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct NotificationMessage {
    pub severity: Severity,
    pub category: String,
    pub summary: String,
    #[serde(flatten)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub extra: Map<String, Value>,
}

/// Persisted notification row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: NotificationMessage,
    pub created_at: DateTime<Utc>,
}

/// Notification before insertion (id assigned by the store)
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: String,
    pub notification_type: String,
    pub title: String,
    pub message: NotificationMessage,
}

/// Per-day count of warn/error notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct DailyIncidents {
    pub day: NaiveDate,
    pub severity: Severity,
    pub count: i64,
}

/// Clamp a requested page size: absent or 0 ⇒ 20, above 100 ⇒ 100
pub fn page_size(requested: Option<i64>) -> i64 {
    match requested {
        None => DEFAULT_PAGE_SIZE,
        Some(n) if n <= 0 => DEFAULT_PAGE_SIZE,
        Some(n) => n.min(MAX_PAGE_SIZE),
    }
}

/// Parse a pagination cursor; "0", empty and garbage mean "from the top"
pub fn parse_cursor(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|c| c.trim().parse::<i64>().ok())
        .filter(|c| *c > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_size_bounds() {
        assert_eq!(page_size(None), 20);
        assert_eq!(page_size(Some(0)), 20);
        assert_eq!(page_size(Some(5)), 5);
        assert_eq!(page_size(Some(100)), 100);
        assert_eq!(page_size(Some(101)), 100);
    }

    #[test]
    fn test_cursor_zero_is_absent() {
        assert_eq!(parse_cursor(Some("0")), None);
        assert_eq!(parse_cursor(Some("")), None);
        assert_eq!(parse_cursor(Some("abc")), None);
        assert_eq!(parse_cursor(None), None);
        assert_eq!(parse_cursor(Some("42")), Some(42));
    }

    #[test]
    fn test_message_preserves_extra_fields() {
        let message: NotificationMessage = serde_json::from_value(json!({
            "severity": "warn",
            "category": "siterank",
            "summary": "analysis failed",
            "analysisId": "a1"
        }))
        .unwrap();
        assert_eq!(message.severity, Severity::Warn);
        assert_eq!(message.extra["analysisId"], "a1");
        let back = serde_json::to_value(&message).unwrap();
        assert_eq!(back["analysisId"], "a1");
    }
}
