//! Keyed limiter manager with TTL expiry and LRU eviction

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::limiter::Limiter;
use super::policy::RateSpec;

struct Entry {
    limiter: Arc<Limiter>,
    spec: RateSpec,
    last_used: Instant,
}

/// Map of `key → Limiter`.
///
/// Entries idle longer than `ttl` are dropped and rebuilt on next use. When a
/// new key would exceed `max_keys`, expired entries are purged first and then
/// the least recently used entry is evicted. A key whose spec changed gets a
/// fresh limiter.
pub struct KeyedLimiters {
    ttl: Duration,
    max_keys: usize,
    entries: Mutex<HashMap<String, Entry>>,
}

impl KeyedLimiters {
    pub fn new(ttl: Duration, max_keys: usize) -> Self {
        Self {
            ttl,
            max_keys: max_keys.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get (or create) the limiter for `key` with the given spec
    pub fn get(&self, key: &str, spec: RateSpec) -> Arc<Limiter> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(key) {
            let fresh = now.duration_since(entry.last_used) <= self.ttl;
            if fresh && entry.spec == spec {
                entry.last_used = now;
                return entry.limiter.clone();
            }
            entries.remove(key);
        }

        if entries.len() >= self.max_keys {
            let ttl = self.ttl;
            entries.retain(|_, e| now.duration_since(e.last_used) <= ttl);
        }
        if entries.len() >= self.max_keys {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                tracing::debug!(key = %oldest, "evicting least recently used limiter");
                entries.remove(&oldest);
            }
        }

        let limiter = Arc::new(Limiter::new(spec.rpm, spec.concurrency));
        entries.insert(
            key.to_string(),
            Entry {
                limiter: limiter.clone(),
                spec,
                last_used: now,
            },
        );
        limiter
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}
