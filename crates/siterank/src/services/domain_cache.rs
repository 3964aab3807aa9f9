// Two-level domain cache: bounded process cache in front of the shared domain_cache table

use std::sync::Arc;
use std::time::{Duration, Instant};

use autoads_core::siterank::DomainCacheEntry;
use autoads_core::{DomainCacheStore, StoreResult};
use chrono::Utc;
use moka::sync::Cache;
use moka::Expiry;

pub const LOCAL_CAPACITY: u64 = 10_000;

/// Local entries live exactly as long as the row's expires_at (7d ok, 1d failed)
struct UntilExpiresAt;

impl UntilExpiresAt {
    fn remaining(entry: &DomainCacheEntry) -> Option<Duration> {
        Some((entry.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }
}

impl Expiry<String, DomainCacheEntry> for UntilExpiresAt {
    fn expire_after_create(&self, _host: &String, entry: &DomainCacheEntry, _created_at: Instant) -> Option<Duration> {
        Self::remaining(entry)
    }

    fn expire_after_update(
        &self,
        _host: &String,
        entry: &DomainCacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Self::remaining(entry)
    }
}

pub struct DomainCache {
    local: Cache<String, DomainCacheEntry>,
    store: Arc<dyn DomainCacheStore>,
}

impl DomainCache {
    pub fn new(store: Arc<dyn DomainCacheStore>) -> Self {
        Self::with_capacity(store, LOCAL_CAPACITY)
    }

    pub fn with_capacity(store: Arc<dyn DomainCacheStore>, capacity: u64) -> Self {
        let local = Cache::builder()
            .max_capacity(capacity)
            .expire_after(UntilExpiresAt)
            .build();
        Self { local, store }
    }

    /// Fresh entry for `host`, from the process cache first, then the table
    pub async fn get(&self, host: &str) -> StoreResult<Option<DomainCacheEntry>> {
        let now = Utc::now();
        if let Some(entry) = self.local.get(host).filter(|e| e.is_fresh(now)) {
            return Ok(Some(entry));
        }

        match self.store.get_domain(host).await? {
            Some(entry) if entry.is_fresh(now) => {
                self.local.insert(host.to_string(), entry.clone());
                Ok(Some(entry))
            }
            _ => {
                self.local.invalidate(host);
                Ok(None)
            }
        }
    }

    /// Write through both levels; a table failure still fills the process cache
    pub async fn put(&self, entry: DomainCacheEntry) {
        if let Err(e) = self.store.put_domain(&entry).await {
            tracing::warn!(host = %entry.host, "Failed to persist domain cache entry: {}", e);
        }
        self.local.insert(entry.host.clone(), entry);
    }

    /// Entries currently held in process
    pub fn local_len(&self) -> u64 {
        self.local.run_pending_tasks();
        self.local.entry_count()
    }
}
