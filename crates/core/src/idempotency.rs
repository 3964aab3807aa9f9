// Idempotency keys
//
// Keys arrive in `X-Idempotency-Key`. Invalid keys are dropped silently:
// a bad key never fails the request on its own.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request header carrying the key (also used for outbound propagation)
pub const HEADER: &str = "x-idempotency-key";

/// Maximum key length in bytes
pub const MAX_KEY_LEN: usize = 128;

/// Default lifetime of a key binding
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Binding scopes used by the services
pub mod scope {
    pub const SITERANK_ANALYZE: &str = "siterank.analyze";
    pub const OFFERS_CREATE: &str = "offers.create";
    pub const BILLING_RESERVE: &str = "billing.reserve";
    pub const BILLING_DEBIT: &str = "billing.debit";
    pub const BILLING_REVERT: &str = "billing.revert";
    pub const BULK_ACTIONS_CREATE: &str = "adscenter.bulk_actions";
    /// Keyed by event id: one notification per delivered event
    pub const NOTIFICATIONS_EVENT: &str = "notifications.event";
}

/// A validated idempotency key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Validate a raw header value. Returns None for anything unusable:
    /// empty, longer than 128 bytes, or containing whitespace or control characters.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || raw.len() > MAX_KEY_LEN {
            return None;
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key → target binding persisted by the idempotency store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyBinding {
    pub key: String,
    pub user_id: String,
    pub scope: String,
    pub target_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyBinding {
    pub fn new(
        key: &IdempotencyKey,
        user_id: impl Into<String>,
        scope: impl Into<String>,
        target_id: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            key: key.as_str().to_string(),
            user_id: user_id.into(),
            scope: scope.into(),
            target_id: target_id.into(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub fn default_ttl() -> Duration {
    Duration::hours(DEFAULT_TTL_HOURS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_exactly_128_bytes() {
        let key = "k".repeat(128);
        assert!(IdempotencyKey::parse(&key).is_some());
    }

    #[test]
    fn test_drops_129_bytes() {
        let key = "k".repeat(129);
        assert!(IdempotencyKey::parse(&key).is_none());
    }

    #[test]
    fn test_drops_whitespace_and_controls() {
        assert!(IdempotencyKey::parse("").is_none());
        assert!(IdempotencyKey::parse("has space").is_none());
        assert!(IdempotencyKey::parse("tab\there").is_none());
        assert!(IdempotencyKey::parse("bell\u{7}").is_none());
        assert!(IdempotencyKey::parse("nl\n").is_none());
    }

    #[test]
    fn test_accepts_typical_keys() {
        let key = IdempotencyKey::parse("order-2024-01-01_abc:1").unwrap();
        assert_eq!(key.as_str(), "order-2024-01-01_abc:1");
        assert_eq!(key.to_string(), "order-2024-01-01_abc:1");
    }

    #[test]
    fn test_binding_expiry() {
        let key = IdempotencyKey::parse("k1").unwrap();
        let binding = IdempotencyBinding::new(&key, "u1", scope::SITERANK_ANALYZE, "a1", default_ttl());
        assert!(!binding.is_expired(Utc::now()));
        assert!(binding.is_expired(Utc::now() + Duration::hours(25)));
    }
}
