// OAuth access tokens for Google APIs
//
// Sources, in order: a static token from GOOGLE_OAUTH_ACCESS_TOKEN, the GCE
// metadata server, or none at all (emulators accept unauthenticated calls).

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use crate::error::{check_status, CloudError};

pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
const METADATA_TOKEN_PATH: &str =
    "/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the metadata token expires
const EXPIRY_SLACK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
enum Mode {
    Static(String),
    Metadata { url: String },
    Anonymous,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

/// Bearer token provider shared by every cloud client
pub struct TokenProvider {
    mode: Mode,
    http: reqwest::Client,
    cached: Mutex<Option<(String, Instant)>>,
}

impl TokenProvider {
    pub fn fixed(token: impl Into<String>) -> Self {
        Self::with_mode(Mode::Static(token.into()))
    }

    /// Metadata server at `base_url` (scheme and host, no path)
    pub fn metadata(base_url: &str) -> Self {
        Self::with_mode(Mode::Metadata {
            url: format!("{}{}", base_url.trim_end_matches('/'), METADATA_TOKEN_PATH),
        })
    }

    pub fn anonymous() -> Self {
        Self::with_mode(Mode::Anonymous)
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            cached: Mutex::new(None),
        }
    }

    /// Static token when set, else the metadata server (`GCE_METADATA_HOST` overrides the host)
    pub fn from_env() -> Self {
        match std::env::var(ACCESS_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => Self::fixed(token.trim()),
            _ => {
                let host = std::env::var("GCE_METADATA_HOST")
                    .unwrap_or_else(|_| DEFAULT_METADATA_HOST.to_string());
                Self::metadata(&format!("http://{}", host))
            }
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self.mode, Mode::Anonymous)
    }

    /// Current bearer token; None when calls go out unauthenticated
    pub async fn token(&self) -> Result<Option<String>, CloudError> {
        match &self.mode {
            Mode::Anonymous => Ok(None),
            Mode::Static(token) => Ok(Some(token.clone())),
            Mode::Metadata { url } => {
                if let Some((token, expires_at)) = self.cached.lock().as_ref() {
                    if Instant::now() < *expires_at {
                        return Ok(Some(token.clone()));
                    }
                }

                let response = self
                    .http
                    .get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| CloudError::Auth(e.to_string()))?;
                let response = check_status(response, "metadata token").await?;
                let fetched: MetadataToken = response
                    .json()
                    .await
                    .map_err(|e| CloudError::Decode(e.to_string()))?;

                let lifetime = Duration::from_secs(fetched.expires_in).saturating_sub(EXPIRY_SLACK);
                debug!(expires_in = fetched.expires_in, "Fetched metadata access token");
                *self.cached.lock() = Some((fetched.access_token.clone(), Instant::now() + lifetime));
                Ok(Some(fetched.access_token))
            }
        }
    }

    /// Attach the bearer header when a token is available
    pub async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, CloudError> {
        Ok(match self.token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fixed_and_anonymous() {
        assert_eq!(
            TokenProvider::fixed("abc").token().await.unwrap().as_deref(),
            Some("abc")
        );
        assert!(TokenProvider::anonymous().token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_metadata_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(METADATA_TOKEN_PATH))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = TokenProvider::metadata(&server.uri());
        assert_eq!(provider.token().await.unwrap().as_deref(), Some("ya29.token"));
        assert_eq!(provider.token().await.unwrap().as_deref(), Some("ya29.token"));
    }

    #[tokio::test]
    async fn test_metadata_failure_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provider = TokenProvider::metadata(&server.uri());
        let err = provider.token().await.unwrap_err();
        assert!(matches!(err, CloudError::Http { status: 500, .. }));
    }
}
