// Browser executor client: resolves an offer link to its final URL suffix

use std::time::Duration;

use autoads_core::UpstreamError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveRequest<'a> {
    url: &'a str,
    timeout_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveResponse {
    #[serde(default)]
    final_url_suffix: Option<String>,
    #[serde(default)]
    final_url: Option<String>,
}

impl ResolveResponse {
    fn suffix(self) -> Option<String> {
        if let Some(suffix) = self.final_url_suffix.filter(|s| !s.is_empty()) {
            return Some(suffix);
        }
        let final_url = url::Url::parse(self.final_url.as_deref()?).ok()?;
        final_url.query().filter(|q| !q.is_empty()).map(str::to_string)
    }
}

pub struct BrowserResolver {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserResolver {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Final URL suffix the offer link lands on, None when there is no query
    pub async fn resolve_suffix(&self, url: &str, timeout: Duration) -> Result<Option<String>, UpstreamError> {
        let mut request = self
            .http
            .post(format!("{}/api/v1/browser/resolve-offer", self.base_url))
            // Leave the executor time to answer after its own deadline
            .timeout(timeout + Duration::from_secs(5))
            .json(&ResolveRequest {
                url,
                timeout_ms: timeout.as_millis() as u64,
            });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Transport(e.to_string())
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let body: ResolveResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Ok(body.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_resolves_suffix_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/browser/resolve-offer"))
            .and(header("authorization", "Bearer internal"))
            .and(body_partial_json(json!({ "url": "https://offer.example/go", "timeoutMs": 15000 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "finalUrlSuffix": "clickid=abc&utm_source=x"
            })))
            .mount(&server)
            .await;

        let browser = BrowserResolver::new(&server.uri(), Some("internal".into()));
        let suffix = browser
            .resolve_suffix("https://offer.example/go", DEFAULT_RESOLVE_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(suffix.as_deref(), Some("clickid=abc&utm_source=x"));
    }

    #[tokio::test]
    async fn test_falls_back_to_final_url_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "finalUrl": "https://shop.example/landing?ref=aff1&sub=2"
            })))
            .mount(&server)
            .await;

        let browser = BrowserResolver::new(&server.uri(), None);
        let suffix = browser
            .resolve_suffix("https://offer.example/go", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(suffix.as_deref(), Some("ref=aff1&sub=2"));
    }

    #[tokio::test]
    async fn test_executor_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let browser = BrowserResolver::new(&server.uri(), None);
        let result = browser
            .resolve_suffix("https://offer.example/go", Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(UpstreamError::Http { status: 503, .. })));
    }
}
