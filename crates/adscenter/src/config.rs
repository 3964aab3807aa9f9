// Adscenter configuration
//
// Plain settings come from the environment. Credentials may also come from
// Secret Manager through `<KEY>_SECRET_NAME` (an explicit env value wins).

use std::time::Duration;

use anyhow::Result;
use autoads_cloud::{env_or_secret, SecretCache};
use autoads_core::ratelimit::{RateSpec, RetryPolicy};

pub const DEFAULT_ADS_API_VERSION: &str = "v17";
pub const DEFAULT_ADS_BASE_URL: &str = "https://googleads.googleapis.com";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_CONSENT_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const ADWORDS_SCOPE: &str = "https://www.googleapis.com/auth/adwords";

/// Google Ads credentials of the platform
#[derive(Clone, Default)]
pub struct AdsCredentials {
    pub developer_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Platform refresh token used when a user has no connection of their own
    pub refresh_token: Option<String>,
    /// Platform MCC
    pub login_customer_id: Option<String>,
    pub test_customer_id: Option<String>,
}

impl std::fmt::Debug for AdsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdsCredentials")
            .field("developer_token", &self.developer_token.is_some())
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.is_some())
            .field("refresh_token", &self.refresh_token.is_some())
            .field("login_customer_id", &self.login_customer_id)
            .field("test_customer_id", &self.test_customer_id)
            .finish()
    }
}

impl AdsCredentials {
    /// Load `GOOGLE_ADS_*` values, each from env or its secret
    pub async fn load(secrets: Option<&SecretCache>) -> Result<Self> {
        Ok(Self {
            developer_token: env_or_secret(secrets, "GOOGLE_ADS_DEVELOPER_TOKEN").await?,
            client_id: env_or_secret(secrets, "GOOGLE_ADS_OAUTH_CLIENT_ID").await?,
            client_secret: env_or_secret(secrets, "GOOGLE_ADS_OAUTH_CLIENT_SECRET").await?,
            refresh_token: env_or_secret(secrets, "GOOGLE_ADS_REFRESH_TOKEN").await?,
            login_customer_id: env_or_secret(secrets, "GOOGLE_ADS_LOGIN_CUSTOMER_ID")
                .await?
                .map(|id| id.replace('-', "")),
            test_customer_id: env_or_secret(secrets, "GOOGLE_ADS_TEST_CUSTOMER_ID")
                .await?
                .map(|id| id.replace('-', "")),
        })
    }

    /// Developer token plus OAuth client: enough to call the API live
    pub fn is_complete(&self) -> bool {
        self.developer_token.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }
}

/// Service settings
#[derive(Debug, Clone)]
pub struct AdscenterConfig {
    pub credentials: AdsCredentials,
    /// Full REST base, version included
    pub ads_base_url: String,
    pub token_url: String,
    pub consent_url: String,
    pub redirect_urls: Vec<String>,
    pub oauth_state_secret: Option<String>,
    pub precheck_live: bool,
    pub precheck_timeout: Duration,
    pub precheck_total_timeout: Duration,
    pub mcc_live: bool,
    /// When false every mutation is sent validate-only
    pub live_mutate: bool,
    pub rate: RateSpec,
    pub retry: RetryPolicy,
    pub limits_secret: Option<String>,
    pub limits_json: Option<String>,
    pub browser_exec_url: Option<String>,
    pub browser_token: Option<String>,
}

impl Default for AdscenterConfig {
    fn default() -> Self {
        Self {
            credentials: AdsCredentials::default(),
            ads_base_url: format!("{}/{}", DEFAULT_ADS_BASE_URL, DEFAULT_ADS_API_VERSION),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            consent_url: DEFAULT_CONSENT_URL.to_string(),
            redirect_urls: Vec::new(),
            oauth_state_secret: None,
            precheck_live: false,
            precheck_timeout: Duration::from_millis(1500),
            precheck_total_timeout: Duration::from_millis(2500),
            mcc_live: false,
            live_mutate: false,
            rate: RateSpec {
                rpm: 60,
                concurrency: 4,
            },
            retry: RetryPolicy::exponential(),
            limits_secret: None,
            limits_json: None,
            browser_exec_url: None,
            browser_token: None,
        }
    }
}

fn flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn millis(key: &str, default: u64) -> Duration {
    Duration::from_millis(
        std::env::var(key)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default),
    )
}

/// Split a newline/comma separated list
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(['\n', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl AdscenterConfig {
    /// Create config from environment variables.
    /// - GOOGLE_ADS_* credentials (and *_SECRET_NAME variants)
    /// - GOOGLE_ADS_API_VERSION (default: v17), GOOGLE_ADS_BASE_URL, GOOGLE_OAUTH_TOKEN_URL
    /// - ADS_OAUTH_REDIRECT_URL / ADS_OAUTH_REDIRECT_URLS, OAUTH_STATE_SECRET
    /// - ADS_PRECHECK_ENABLE_LIVE, ADS_PRECHECK_TIMEOUT_MS (1500), ADS_PRECHECK_TOTAL_TIMEOUT_MS (2500)
    /// - ADS_MCC_ENABLE_LIVE, ADS_LIVE_MUTATE
    /// - ADS_RATE_LIMIT_RPM (60), ADS_CONCURRENCY_MAX (4), ADS_RETRY_* (see RetryPolicy)
    /// - ADSCENTER_LIMITS_SECRET or ADSCENTER_LIMITS_JSON
    /// - BROWSER_EXEC_URL, BROWSER_INTERNAL_TOKEN
    pub async fn load(secrets: Option<&SecretCache>) -> Result<Self> {
        let defaults = Self::default();
        let version = non_empty("GOOGLE_ADS_API_VERSION")
            .unwrap_or_else(|| DEFAULT_ADS_API_VERSION.to_string());
        let base = non_empty("GOOGLE_ADS_BASE_URL").unwrap_or_else(|| DEFAULT_ADS_BASE_URL.to_string());

        let mut redirect_urls = non_empty("ADS_OAUTH_REDIRECT_URLS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();
        if let Some(single) = non_empty("ADS_OAUTH_REDIRECT_URL") {
            if !redirect_urls.contains(&single) {
                redirect_urls.push(single);
            }
        }

        Ok(Self {
            credentials: AdsCredentials::load(secrets).await?,
            ads_base_url: format!("{}/{}", base.trim_end_matches('/'), version),
            token_url: non_empty("GOOGLE_OAUTH_TOKEN_URL").unwrap_or(defaults.token_url),
            consent_url: defaults.consent_url,
            redirect_urls,
            oauth_state_secret: env_or_secret(secrets, "OAUTH_STATE_SECRET").await?,
            precheck_live: flag("ADS_PRECHECK_ENABLE_LIVE"),
            precheck_timeout: millis("ADS_PRECHECK_TIMEOUT_MS", 1500),
            precheck_total_timeout: millis("ADS_PRECHECK_TOTAL_TIMEOUT_MS", 2500),
            mcc_live: flag("ADS_MCC_ENABLE_LIVE"),
            live_mutate: flag("ADS_LIVE_MUTATE"),
            rate: RateSpec {
                rpm: std::env::var("ADS_RATE_LIMIT_RPM")
                    .ok()
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(defaults.rate.rpm),
                concurrency: std::env::var("ADS_CONCURRENCY_MAX")
                    .ok()
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(defaults.rate.concurrency),
            },
            retry: RetryPolicy::from_env(),
            limits_secret: non_empty("ADSCENTER_LIMITS_SECRET"),
            limits_json: non_empty("ADSCENTER_LIMITS_JSON"),
            browser_exec_url: non_empty("BROWSER_EXEC_URL").map(|u| u.trim_end_matches('/').to_string()),
            browser_token: env_or_secret(secrets, "BROWSER_INTERNAL_TOKEN").await?,
        })
    }

    /// Whether live calls should go to Google Ads at all
    pub fn wants_live_client(&self) -> bool {
        (self.precheck_live || self.mcc_live || self.live_mutate) && self.credentials.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list("https://a.example.com/cb,\nhttps://b.example.com/cb\n\n"),
            vec!["https://a.example.com/cb", "https://b.example.com/cb"]
        );
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let creds = AdsCredentials {
            developer_token: Some("dev-secret".into()),
            client_secret: Some("client-secret".into()),
            refresh_token: Some("1//refresh".into()),
            ..Default::default()
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("dev-secret"));
        assert!(!rendered.contains("client-secret"));
        assert!(!rendered.contains("1//refresh"));
    }

    #[test]
    fn test_live_client_needs_credentials() {
        let mut config = AdscenterConfig {
            live_mutate: true,
            ..Default::default()
        };
        assert!(!config.wants_live_client());
        config.credentials = AdsCredentials {
            developer_token: Some("d".into()),
            client_id: Some("c".into()),
            client_secret: Some("s".into()),
            ..Default::default()
        };
        assert!(config.wants_live_client());
    }
}
