// Siterank analysis entities
//
// An analysis moves pending → running → completed | failed. At most one
// analysis per offer may be active (pending or running) at a time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Cache lifetime of a successful upstream payload
pub fn success_ttl() -> Duration {
    Duration::days(7)
}

/// Cache lifetime of an upstream failure
pub fn failure_ttl() -> Duration {
    Duration::days(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Running => "running",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    /// Pending or running
    pub fn is_active(&self) -> bool {
        matches!(self, AnalysisStatus::Pending | AnalysisStatus::Running)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AnalysisStatus::Pending),
            "running" => Ok(AnalysisStatus::Running),
            "completed" => Ok(AnalysisStatus::Completed),
            "failed" => Ok(AnalysisStatus::Failed),
            other => Err(format!("unknown analysis status: {}", other)),
        }
    }
}

/// Siterank analysis aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub id: Uuid,
    pub user_id: String,
    pub offer_id: String,
    pub status: AnalysisStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Analysis {
    pub fn pending(user_id: impl Into<String>, offer_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            offer_id: offer_id.into(),
            status: AnalysisStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Shared per-host cache of upstream traffic payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainCacheEntry {
    pub host: String,
    pub payload: Value,
    pub ok: bool,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DomainCacheEntry {
    /// Build an entry with the TTL that matches its outcome
    pub fn new(host: impl Into<String>, payload: Value, ok: bool) -> Self {
        let now = Utc::now();
        let ttl = if ok { success_ttl() } else { failure_ttl() };
        Self {
            host: host.into(),
            payload,
            ok,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Lower-cased host of an offer URL; bare domains are accepted
pub fn host_of(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    let parsed = url::Url::parse(&candidate).ok()?;
    let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_ttls() {
        let ok = DomainCacheEntry::new("foo.com", Value::Null, true);
        assert_eq!(ok.expires_at - ok.updated_at, Duration::days(7));
        let failed = DomainCacheEntry::new("foo.com", Value::Null, false);
        assert_eq!(failed.expires_at - failed.updated_at, Duration::days(1));
        assert!(ok.is_fresh(Utc::now()));
        assert!(!failed.is_fresh(Utc::now() + Duration::days(2)));
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://Foo.com/path?q=1").as_deref(), Some("foo.com"));
        assert_eq!(host_of("foo.com").as_deref(), Some("foo.com"));
        assert_eq!(host_of("http://www.bar.co.uk:8080/").as_deref(), Some("www.bar.co.uk"));
        assert_eq!(host_of(""), None);
        assert_eq!(host_of("https://"), None);
    }

    #[test]
    fn test_active_statuses() {
        assert!(AnalysisStatus::Pending.is_active());
        assert!(AnalysisStatus::Running.is_active());
        assert!(!AnalysisStatus::Completed.is_active());
        assert_eq!("failed".parse::<AnalysisStatus>().unwrap(), AnalysisStatus::Failed);
    }
}
