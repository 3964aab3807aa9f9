// Google OAuth token endpoint

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use super::{AdsError, AdsResult};

/// Refresh this long before the reported expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

pub struct OAuthClient {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    // sha256(refresh token) -> (access token, expiry)
    cache: Mutex<HashMap<String, (String, Instant)>>,
}

impl OAuthClient {
    pub fn new(token_url: &str, client_id: &str, client_secret: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> AdsResult<TokenResponse> {
        let response = self.http.post(&self.token_url).form(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdsError::Http {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AdsError::Decode(e.to_string()))
    }

    /// Exchange an authorization code from the consent redirect
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> AdsResult<TokenResponse> {
        self.post_form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    /// Access token for a refresh token, cached until shortly before expiry
    pub async fn access_token(&self, refresh_token: &str) -> AdsResult<String> {
        let key = format!("{:x}", Sha256::digest(refresh_token.as_bytes()));
        if let Some((token, expires_at)) = self.cache.lock().get(&key) {
            if Instant::now() < *expires_at {
                return Ok(token.clone());
            }
        }

        let response = self
            .post_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ])
            .await?;

        let lifetime = Duration::from_secs(response.expires_in.unwrap_or(3600));
        let expires_at = Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN);
        self.cache
            .lock()
            .insert(key, (response.access_token.clone(), expires_at));
        Ok(response.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_exchange_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.a",
                "refresh_token": "1//r",
                "expires_in": 3599
            })))
            .mount(&server)
            .await;

        let client = OAuthClient::new(&format!("{}/token", server.uri()), "cid", "secret");
        let tokens = client
            .exchange_code("auth-code", "https://app.example.com/cb")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "ya29.a");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//r"));
    }

    #[tokio::test]
    async fn test_access_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.cached",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OAuthClient::new(&format!("{}/token", server.uri()), "cid", "secret");
        assert_eq!(client.access_token("1//r").await.unwrap(), "ya29.cached");
        assert_eq!(client.access_token("1//r").await.unwrap(), "ya29.cached");
    }

    #[tokio::test]
    async fn test_rejected_grant_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let client = OAuthClient::new(&format!("{}/token", server.uri()), "cid", "secret");
        match client.access_token("1//revoked").await {
            Err(AdsError::Http { status, message }) => {
                assert_eq!(status, 400);
                assert!(message.contains("invalid_grant"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
