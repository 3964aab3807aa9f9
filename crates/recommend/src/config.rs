// Recommend configuration
//
// Environment variables:
// - BROWSER_EXEC_URL / BROWSER_INTERNAL_TOKEN: page-signals collaborator (optional)
// - BRAND_SIGNALS_TIMEOUT_MS: landing signal budget (default 1200)
// - BRAND_SIGNALS_MAX_BYTES: landing page read cap (default 524288)
// - BQ_*: keyword warehouse, see autoads_cloud::WarehouseConfig

use std::time::Duration;

pub const DEFAULT_SIGNALS_TIMEOUT: Duration = Duration::from_millis(1200);
pub const DEFAULT_SIGNALS_MAX_BYTES: usize = 512 * 1024;
pub const ALIAS_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Clone)]
pub struct RecommendConfig {
    pub browser_exec_url: Option<String>,
    pub browser_token: Option<String>,
    pub signals_timeout: Duration,
    pub signals_max_bytes: usize,
    pub alias_cache_ttl: Duration,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            browser_exec_url: None,
            browser_token: None,
            signals_timeout: DEFAULT_SIGNALS_TIMEOUT,
            signals_max_bytes: DEFAULT_SIGNALS_MAX_BYTES,
            alias_cache_ttl: ALIAS_CACHE_TTL,
        }
    }
}

impl RecommendConfig {
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            browser_exec_url: var("BROWSER_EXEC_URL"),
            browser_token: var("BROWSER_INTERNAL_TOKEN"),
            signals_timeout: var("BRAND_SIGNALS_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.signals_timeout),
            signals_max_bytes: var("BRAND_SIGNALS_MAX_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.signals_max_bytes),
            alias_cache_ttl: defaults.alias_cache_ttl,
        }
    }
}
