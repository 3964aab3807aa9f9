// Alias sets per seed domain
//
// Derived from the domain plus landing signals, persisted as the brand
// profile, and kept in a bounded process cache for a week.

use std::sync::Arc;
use std::time::Duration;

use autoads_core::brand::{derive_aliases, second_level_label, seed_host, BrandProfile};
use autoads_core::BrandStore;
use chrono::Utc;
use moka::sync::Cache;

use crate::error::{ServiceError, ServiceResult};
use crate::signals::SignalFetcher;

pub const ALIAS_CACHE_CAPACITY: u64 = 5_000;

pub struct AliasService {
    brands: Arc<dyn BrandStore>,
    signals: SignalFetcher,
    cache: Cache<String, Vec<String>>,
}

impl AliasService {
    pub fn new(brands: Arc<dyn BrandStore>, signals: SignalFetcher, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(ALIAS_CACHE_CAPACITY)
            .time_to_live(ttl)
            .build();
        Self { brands, signals, cache }
    }

    /// Alias set for a seed. A landing URL adds its signals and refreshes the set.
    pub async fn aliases_for(&self, seed_domain: &str, landing_url: Option<&str>) -> ServiceResult<Vec<String>> {
        let seed = seed_host(seed_domain);
        if second_level_label(&seed).is_none() {
            return Err(ServiceError::InvalidArgument(format!(
                "seedDomain is not a domain: {:?}",
                seed_domain
            )));
        }

        let landing_url = landing_url.map(str::trim).filter(|u| !u.is_empty());
        if landing_url.is_none() {
            if let Some(hit) = self.cache.get(&seed) {
                return Ok(hit);
            }
        }

        let signals = match landing_url {
            Some(url) => self.signals.fetch(url).await,
            None => Vec::new(),
        };
        let aliases = derive_aliases(&seed, &signals);

        let profile = BrandProfile {
            seed_domain: seed.clone(),
            aliases: aliases.clone(),
            updated_at: Utc::now(),
        };
        if let Err(e) = self.brands.upsert_profile(&profile).await {
            tracing::warn!(seed_domain = %seed, "Failed to persist brand profile: {}", e);
        }

        self.cache.insert(seed, aliases.clone());
        Ok(aliases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoads_core::memory::InMemoryStore;

    fn service(store: Arc<InMemoryStore>) -> AliasService {
        AliasService::new(
            store,
            SignalFetcher::new(Duration::from_millis(200), 1024),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn test_derives_and_persists_profile() {
        let store = Arc::new(InMemoryStore::new());
        let aliases = service(store.clone())
            .aliases_for("https://www.Example.com/shop", None)
            .await
            .unwrap();
        assert_eq!(aliases, vec!["example", "exmpl"]);

        let profile = store.get_profile("example.com").await.unwrap().unwrap();
        assert_eq!(profile.aliases, aliases);
    }

    #[tokio::test]
    async fn test_rejects_non_domains() {
        let store = Arc::new(InMemoryStore::new());
        assert!(matches!(
            service(store).aliases_for("", None).await,
            Err(ServiceError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_second_lookup_is_served_from_cache() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store.clone());
        service.aliases_for("example.com", None).await.unwrap();
        let first = store.get_profile("example.com").await.unwrap().unwrap();

        let again = service.aliases_for("https://example.com/other", None).await.unwrap();
        assert_eq!(again, first.aliases);
        // A cache hit does not rewrite the profile
        let second = store.get_profile("example.com").await.unwrap().unwrap();
        assert_eq!(second.updated_at, first.updated_at);
    }
}
