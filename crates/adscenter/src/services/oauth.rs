// Google Ads account connection (OAuth consent and callback)
//
// The state parameter binds the callback to the user who asked for the
// consent URL: base64url(uid "." base64url(HMAC-SHA256(secret, uid))).

use std::sync::Arc;

use autoads_core::ads::normalize_customer_id;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use utoipa::ToSchema;

use crate::ads::OAuthClient;
use crate::config::{AdscenterConfig, ADWORDS_SCOPE};
use crate::error::{ServiceError, ServiceResult};
use autoads_storage::RefreshTokenVault;

type HmacSha256 = Hmac<Sha256>;

fn sign(user_id: &str, secret: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(user_id.as_bytes());
    Some(mac)
}

/// Signed state for `user_id`
pub fn state_for(user_id: &str, secret: &str) -> Option<String> {
    let signature = sign(user_id, secret)?.finalize().into_bytes();
    let inner = format!("{}.{}", user_id, URL_SAFE_NO_PAD.encode(signature));
    Some(URL_SAFE_NO_PAD.encode(inner))
}

/// User id carried by a valid state, None when forged or malformed
pub fn verify_state(state: &str, secret: &str) -> Option<String> {
    let decoded = URL_SAFE_NO_PAD.decode(state.trim()).ok()?;
    let inner = String::from_utf8(decoded).ok()?;
    let (user_id, signature) = inner.rsplit_once('.')?;
    if user_id.is_empty() {
        return None;
    }
    let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
    sign(user_id, secret)?.verify_slice(&signature).ok()?;
    Some(user_id.to_string())
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    let host = host.split(':').next().unwrap_or_default();
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

/// Redirect URL whose host matches the request host (`www.` and port
/// ignored), else the first configured one
pub fn select_redirect<'a>(urls: &'a [String], host: Option<&str>) -> Option<&'a str> {
    if let Some(host) = host.map(normalize_host).filter(|h| !h.is_empty()) {
        let matched = urls.iter().find(|candidate| {
            url::Url::parse(candidate)
                .ok()
                .and_then(|u| u.host_str().map(normalize_host))
                .is_some_and(|h| h == host)
        });
        if let Some(found) = matched {
            return Some(found.as_str());
        }
    }
    urls.first().map(String::as_str)
}

/// Google consent URL requesting offline access
pub fn consent_url(
    base: &str,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
) -> Result<String, url::ParseError> {
    let url = url::Url::parse_with_params(
        base,
        &[
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", ADWORDS_SCOPE),
            ("access_type", "offline"),
            ("approval_prompt", "force"),
            ("state", state),
        ],
    )?;
    Ok(url.into())
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedAccount {
    pub user_id: String,
    pub login_customer_id: Option<String>,
    pub connected: bool,
}

pub struct OAuthService {
    config: Arc<AdscenterConfig>,
    client: Option<Arc<OAuthClient>>,
    vault: RefreshTokenVault,
}

impl OAuthService {
    pub fn new(config: Arc<AdscenterConfig>, client: Option<Arc<OAuthClient>>, vault: RefreshTokenVault) -> Self {
        Self {
            config,
            client,
            vault,
        }
    }

    fn client(&self) -> ServiceResult<&OAuthClient> {
        self.client
            .as_deref()
            .ok_or_else(|| ServiceError::NotConfigured("Google OAuth client is not configured".into()))
    }

    fn state_secret(&self) -> ServiceResult<&str> {
        self.config
            .oauth_state_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServiceError::NotConfigured("OAUTH_STATE_SECRET is not configured".into()))
    }

    fn redirect_for(&self, host: Option<&str>) -> ServiceResult<&str> {
        select_redirect(&self.config.redirect_urls, host)
            .ok_or_else(|| ServiceError::NotConfigured("ADS_OAUTH_REDIRECT_URLS is not configured".into()))
    }

    pub fn authorization_url(&self, user_id: &str, host: Option<&str>) -> ServiceResult<String> {
        let client = self.client()?;
        let redirect = self.redirect_for(host)?;
        let state = state_for(user_id, self.state_secret()?)
            .ok_or_else(|| ServiceError::NotConfigured("OAUTH_STATE_SECRET is unusable".into()))?;
        consent_url(&self.config.consent_url, client.client_id(), redirect, &state)
            .map_err(|e| ServiceError::NotConfigured(format!("invalid consent URL: {}", e)))
    }

    /// Verify the state, exchange the code and store the refresh token
    pub async fn complete(
        &self,
        code: &str,
        state: &str,
        login_customer_id: Option<&str>,
        host: Option<&str>,
    ) -> ServiceResult<ConnectedAccount> {
        let user_id = verify_state(state, self.state_secret()?)
            .ok_or_else(|| ServiceError::invalid("Invalid OAuth state"))?;
        if code.trim().is_empty() {
            return Err(ServiceError::invalid("Missing authorization code"));
        }
        let login_customer_id = match login_customer_id.filter(|s| !s.trim().is_empty()) {
            Some(raw) => Some(normalize_customer_id(raw).ok_or_else(|| {
                ServiceError::invalid("login_customer_id must be a 10-digit customer id")
            })?),
            None => None,
        };

        let redirect = self.redirect_for(host)?;
        let tokens = self.client()?.exchange_code(code, redirect).await?;
        let refresh_token = tokens
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ServiceError::invalid("Google did not return a refresh token; revoke access and retry")
            })?;

        self.vault
            .save(&user_id, login_customer_id.clone(), None, &refresh_token)
            .await?;
        tracing::info!(user_id = %user_id, "Connected Google Ads account");

        Ok(ConnectedAccount {
            user_id,
            login_customer_id,
            connected: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoads_core::memory::InMemoryStore;
    use autoads_core::ConnectionStore;
    use autoads_storage::TokenCipher;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_state_round_trip_and_tamper() {
        let state = state_for("user-42", "s3cret").unwrap();
        assert_eq!(verify_state(&state, "s3cret").as_deref(), Some("user-42"));
        assert!(verify_state(&state, "other").is_none());

        let forged = URL_SAFE_NO_PAD.encode("user-43.AAAA");
        assert!(verify_state(&forged, "s3cret").is_none());
        assert!(verify_state("not base64 !", "s3cret").is_none());
    }

    #[test]
    fn test_select_redirect_by_host() {
        let urls = vec![
            "https://app.example.com/oauth/callback".to_string(),
            "https://www.autoads.dev/oauth/callback".to_string(),
        ];
        assert_eq!(
            select_redirect(&urls, Some("autoads.dev:443")),
            Some("https://www.autoads.dev/oauth/callback")
        );
        assert_eq!(
            select_redirect(&urls, Some("www.app.example.com")),
            Some("https://app.example.com/oauth/callback")
        );
        assert_eq!(
            select_redirect(&urls, Some("unknown.io")),
            Some("https://app.example.com/oauth/callback")
        );
        assert_eq!(select_redirect(&[], Some("autoads.dev")), None);
    }

    #[test]
    fn test_consent_url_params() {
        let raw = consent_url(
            "https://accounts.google.com/o/oauth2/auth",
            "cid",
            "https://app.example.com/cb",
            "st",
        )
        .unwrap();
        let url = url::Url::parse(&raw).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["approval_prompt"], "force");
        assert_eq!(params["scope"], ADWORDS_SCOPE);
        assert_eq!(params["redirect_uri"], "https://app.example.com/cb");
        assert_eq!(params["state"], "st");
    }

    fn service(server: &MockServer, store: Arc<InMemoryStore>) -> OAuthService {
        let config = AdscenterConfig {
            redirect_urls: vec!["https://app.example.com/cb".into()],
            oauth_state_secret: Some("s3cret".into()),
            ..Default::default()
        };
        let client = OAuthClient::new(&format!("{}/token", server.uri()), "cid", "secret");
        OAuthService::new(
            Arc::new(config),
            Some(Arc::new(client)),
            RefreshTokenVault::new(store, Arc::new(TokenCipher::plaintext())),
        )
    }

    #[tokio::test]
    async fn test_callback_stores_connection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.a",
                "refresh_token": "1//fresh",
                "expires_in": 3599
            })))
            .mount(&server)
            .await;
        let store = Arc::new(InMemoryStore::new());
        let oauth = service(&server, store.clone());

        let state = state_for("u1", "s3cret").unwrap();
        let account = oauth
            .complete("code", &state, Some("123-456-7890"), None)
            .await
            .unwrap();
        assert_eq!(account.user_id, "u1");
        assert_eq!(account.login_customer_id.as_deref(), Some("1234567890"));

        let row = store.get_connection("u1").await.unwrap().unwrap();
        assert_eq!(row.refresh_token, "1//fresh");
    }

    #[tokio::test]
    async fn test_callback_requires_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.a",
                "expires_in": 3599
            })))
            .mount(&server)
            .await;
        let store = Arc::new(InMemoryStore::new());
        let oauth = service(&server, store.clone());

        let state = state_for("u1", "s3cret").unwrap();
        let result = oauth.complete("code", &state, None, None).await;
        assert!(matches!(result, Err(ServiceError::InvalidArgument(_))));
        assert!(store.get_connection("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_callback_rejects_forged_state() {
        let server = MockServer::start().await;
        let oauth = service(&server, Arc::new(InMemoryStore::new()));
        let forged = state_for("u1", "wrong-secret").unwrap();
        let result = oauth.complete("code", &forged, None, None).await;
        assert!(matches!(result, Err(ServiceError::InvalidArgument(_))));
    }
}
