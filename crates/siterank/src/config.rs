// Siterank configuration
//
// Environment variables:
// - SIMILARWEB_BASE_URL: upstream URL template, `%s` is replaced by the host
//   (or SIMILARWEB_BASE_URL_SECRET_NAME)
// - SIMILARWEB_TIMEOUT_MS: per-call timeout (default 15000)
// - SITERANK_RETRY_ATTEMPTS / SITERANK_RETRY_BASE_MS / SITERANK_RETRY_MAX_MS

use std::time::Duration;

use anyhow::Result;
use autoads_cloud::{env_or_secret, SecretCache};
use autoads_core::ratelimit::RetryPolicy;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct SiterankConfig {
    pub similarweb_base_url: Option<String>,
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SiterankConfig {
    fn default() -> Self {
        Self {
            similarweb_base_url: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            retry: RetryPolicy::exponential(),
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl SiterankConfig {
    pub async fn load(secrets: Option<&SecretCache>) -> Result<Self> {
        let defaults = Self::default();

        let mut retry = defaults.retry;
        if let Some(attempts) = env_u64("SITERANK_RETRY_ATTEMPTS") {
            retry = retry.with_max_attempts(attempts as u32);
        }
        if let Some(ms) = env_u64("SITERANK_RETRY_BASE_MS") {
            retry = retry.with_base(Duration::from_millis(ms));
        }
        if let Some(ms) = env_u64("SITERANK_RETRY_MAX_MS") {
            retry = retry.with_max(Duration::from_millis(ms));
        }

        Ok(Self {
            similarweb_base_url: env_or_secret(secrets, "SIMILARWEB_BASE_URL").await?,
            fetch_timeout: env_u64("SIMILARWEB_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.fetch_timeout),
            retry,
        })
    }
}
