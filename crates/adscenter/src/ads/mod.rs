// Google Ads API seam
//
// AdsApi is what the services call. LiveAdsClient speaks REST, StubAdsClient
// answers without network access, ThrottledAds wraps either with limiters and
// retry.

mod live;
mod oauth;
mod stub;
mod throttle;

pub use live::LiveAdsClient;
pub use oauth::{OAuthClient, TokenResponse};
pub use stub::StubAdsClient;
pub use throttle::ThrottledAds;

use async_trait::async_trait;
use autoads_core::ratelimit::{is_transient_message, RateLimitError, RequestRate, Retryable};
use autoads_core::ErrorCode;
use autoads_server::ApiError;
use serde_json::Value;
use thiserror::Error;

/// Errors from Google Ads calls
#[derive(Debug, Error)]
pub enum AdsError {
    /// Platform credentials are missing (developer token, OAuth client)
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    /// The user has not connected a Google Ads account
    #[error("no Google Ads connection for user")]
    NotConnected,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Google Ads returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("Google Ads call timed out")]
    Timeout,

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl Retryable for AdsError {
    fn is_retryable(&self) -> bool {
        match self {
            // A known status decides alone; the body may quote ids like 555
            AdsError::Http { status, .. } => *status == 429 || *status >= 500,
            AdsError::Timeout => true,
            AdsError::Transport(message) => is_transient_message(message),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AdsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AdsError::Timeout
        } else if e.is_decode() {
            AdsError::Decode(e.to_string())
        } else {
            AdsError::Transport(e.to_string())
        }
    }
}

impl From<RateLimitError> for AdsError {
    fn from(e: RateLimitError) -> Self {
        match e {
            RateLimitError::Timeout => AdsError::Timeout,
            other => AdsError::RateLimited(other.to_string()),
        }
    }
}

impl From<AdsError> for ApiError {
    fn from(e: AdsError) -> Self {
        match &e {
            AdsError::MissingCredentials(what) => ApiError::new(
                ErrorCode::ServerNotConfigured,
                format!("Google Ads is not configured: {}", what),
            ),
            AdsError::NotConnected => {
                ApiError::invalid_argument("Connect a Google Ads account first")
            }
            AdsError::InvalidArgument(message) => ApiError::invalid_argument(message.clone()),
            AdsError::RateLimited(message) => ApiError::rate_limited(message.clone()),
            AdsError::Http { status: 429, .. } => {
                ApiError::rate_limited("Google Ads rate limit exceeded")
            }
            _ => {
                tracing::warn!("Google Ads call failed: {}", e);
                ApiError::upstream(e.to_string())
            }
        }
    }
}

pub type AdsResult<T> = Result<T, AdsError>;

/// Who a call is made for: the refresh token to act with, the manager
/// account to send as `login-customer-id`, and the caller's rate.
#[derive(Clone, Default)]
pub struct AdsSession {
    pub refresh_token: String,
    pub login_customer_id: Option<String>,
    pub rate: Option<RequestRate>,
}

impl std::fmt::Debug for AdsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdsSession")
            .field("login_customer_id", &self.login_customer_id)
            .field("rate", &self.rate)
            .finish_non_exhaustive()
    }
}

impl AdsSession {
    pub fn with_rate(mut self, rate: RequestRate) -> Self {
        self.rate = Some(rate);
        self
    }
}

#[async_trait]
pub trait AdsApi: Send + Sync {
    /// False for the stub client
    fn is_live(&self) -> bool;

    /// Resource names (`customers/<id>`) reachable with the session's token
    async fn list_accessible_customers(&self, session: &AdsSession) -> AdsResult<Vec<String>>;

    /// GAQL over searchStream; rows flattened across result batches
    async fn search_stream(
        &self,
        session: &AdsSession,
        customer_id: &str,
        query: &str,
    ) -> AdsResult<Vec<Value>>;

    /// `customers/{id}/googleAds:mutate` with `mutateOperations`
    async fn mutate(
        &self,
        session: &AdsSession,
        customer_id: &str,
        operations: &[Value],
        validate_only: bool,
    ) -> AdsResult<Value>;

    /// `customers/{id}/customerManagerLinks:mutate`
    async fn mutate_manager_links(
        &self,
        session: &AdsSession,
        customer_id: &str,
        operations: &[Value],
    ) -> AdsResult<Value>;

    /// Cheapest authenticated call
    async fn ping(&self, session: &AdsSession) -> AdsResult<()> {
        self.list_accessible_customers(session).await.map(|_| ())
    }

    async fn has_active_conversion_tracking(
        &self,
        session: &AdsSession,
        customer_id: &str,
    ) -> AdsResult<bool> {
        let rows = self
            .search_stream(
                session,
                customer_id,
                "SELECT conversion_action.resource_name, conversion_action.status \
                 FROM conversion_action \
                 WHERE conversion_action.status = 'ENABLED' LIMIT 1",
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn has_sufficient_budget(&self, session: &AdsSession, customer_id: &str) -> AdsResult<bool> {
        let rows = self
            .search_stream(
                session,
                customer_id,
                "SELECT campaign_budget.resource_name, campaign_budget.amount_micros \
                 FROM campaign_budget \
                 WHERE campaign_budget.status = 'ENABLED' AND campaign_budget.amount_micros > 0 LIMIT 1",
            )
            .await?;
        Ok(!rows.is_empty())
    }
}

/// Customer id from a resource name such as `customers/123/adGroupAds/1`
pub fn customer_of(resource_name: &str) -> Option<&str> {
    let rest = resource_name.strip_prefix("customers/")?;
    let id = rest.split('/').next()?;
    (!id.is_empty()).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_of() {
        assert_eq!(customer_of("customers/1/adGroupAds/1"), Some("1"));
        assert_eq!(customer_of("customers/1234567890"), Some("1234567890"));
        assert_eq!(customer_of("campaigns/1"), None);
        assert_eq!(customer_of("customers/"), None);
    }

    #[test]
    fn test_retryable_classes() {
        let http = |status| AdsError::Http {
            status,
            message: String::new(),
        };
        assert!(http(429).is_retryable());
        assert!(http(500).is_retryable());
        assert!(!http(400).is_retryable());
        assert!(AdsError::Timeout.is_retryable());
        assert!(!AdsError::InvalidArgument("cpcMicros".into()).is_retryable());
        assert!(!AdsError::NotConnected.is_retryable());
    }

    #[test]
    fn test_client_error_status_wins_over_body_digits() {
        let not_found = AdsError::Http {
            status: 400,
            message: "INVALID_ARGUMENT: resource customers/1234567890/adGroupCriteria/555~1 not found".into(),
        };
        assert!(!not_found.is_retryable());

        let quoted = AdsError::Http {
            status: 403,
            message: "PERMISSION_DENIED: service unavailable for customer 503".into(),
        };
        assert!(!quoted.is_retryable());

        // Untyped transport text still uses message detection
        assert!(AdsError::Transport("connection reset: 503 Service Unavailable".into()).is_retryable());
        assert!(!AdsError::Transport("invalid certificate".into()).is_retryable());
    }

    #[test]
    fn test_api_error_mapping() {
        let e: ApiError = AdsError::Http {
            status: 429,
            message: "RESOURCE_EXHAUSTED".into(),
        }
        .into();
        assert_eq!(e.code, ErrorCode::RateLimited);

        let e: ApiError = AdsError::Http {
            status: 500,
            message: "internal".into(),
        }
        .into();
        assert_eq!(e.code, ErrorCode::Upstream);

        let e: ApiError = AdsError::MissingCredentials("developer token".into()).into();
        assert_eq!(e.code, ErrorCode::ServerNotConfigured);
    }
}
