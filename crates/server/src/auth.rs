// Identity extraction and admin authorization
//
// Order: gateway userinfo header, bearer JWT, X-User-Id. Admins are listed by
// email or uid; internal automation may bypass admin checks with the shared
// service token.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

pub const USERINFO_HEADER: &str = "x-endpoint-api-userinfo";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const SERVICE_TOKEN_HEADER: &str = "x-service-token";

/// How the caller was identified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Gateway,
    Jwt,
    Header,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    pub source: IdentitySource,
}

/// Auth settings loaded once at startup
#[derive(Clone, Default)]
pub struct AuthConfig {
    jwt_key: Option<DecodingKey>,
    pub allow_insecure_jwt: bool,
    pub super_admin_email: Option<String>,
    pub admin_emails: Vec<String>,
    pub admin_uids: Vec<String>,
    pub service_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_verification", &self.jwt_key.is_some())
            .field("allow_insecure_jwt", &self.allow_insecure_jwt)
            .field("admin_emails", &self.admin_emails.len())
            .field("admin_uids", &self.admin_uids.len())
            .field("service_token", &self.service_token.is_some())
            .finish()
    }
}

fn csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl AuthConfig {
    /// Load configuration from environment variables
    ///
    /// - `INTERNAL_JWT_PUBLIC_KEY`: RS256 public key (PEM)
    /// - `ALLOW_INSECURE_INTERNAL_JWT`: accept unverified JWTs when no key is set
    /// - `SUPER_ADMIN_EMAIL`, `ADMIN_EMAILS` (CSV), `ADMIN_UIDS` (CSV)
    /// - `INTERNAL_SERVICE_TOKEN`: shared token for internal automation
    pub fn from_env() -> Self {
        let jwt_key = std::env::var("INTERNAL_JWT_PUBLIC_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .and_then(|pem| match DecodingKey::from_rsa_pem(pem.replace("\\n", "\n").as_bytes()) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!("INTERNAL_JWT_PUBLIC_KEY is not a valid RSA PEM: {}", e);
                    None
                }
            });

        Self {
            jwt_key,
            allow_insecure_jwt: std::env::var("ALLOW_INSECURE_INTERNAL_JWT")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            super_admin_email: std::env::var("SUPER_ADMIN_EMAIL")
                .ok()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty()),
            admin_emails: std::env::var("ADMIN_EMAILS")
                .map(|v| csv(&v.to_lowercase()))
                .unwrap_or_default(),
            admin_uids: std::env::var("ADMIN_UIDS").map(|v| csv(&v)).unwrap_or_default(),
            service_token: std::env::var("INTERNAL_SERVICE_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
        }
    }

    pub fn with_jwt_public_key(mut self, pem: &[u8]) -> Result<Self, jsonwebtoken::errors::Error> {
        self.jwt_key = Some(DecodingKey::from_rsa_pem(pem)?);
        Ok(self)
    }

    pub fn with_admins(mut self, emails: &[&str], uids: &[&str]) -> Self {
        self.admin_emails = emails.iter().map(|e| e.to_lowercase()).collect();
        self.admin_uids = uids.iter().map(|u| u.to_string()).collect();
        self
    }

    pub fn with_service_token(mut self, token: &str) -> Self {
        self.service_token = Some(token.to_string()).filter(|t| !t.is_empty());
        self
    }

    pub fn is_admin(&self, identity: &Identity) -> bool {
        if self.admin_uids.iter().any(|uid| uid == &identity.user_id) {
            return true;
        }
        let Some(email) = identity.email.as_deref().map(str::to_lowercase) else {
            return false;
        };
        self.super_admin_email.as_deref() == Some(email.as_str())
            || self.admin_emails.iter().any(|e| e == &email)
    }

    /// True when the request carries the configured service token
    pub fn is_service_call(&self, headers: &HeaderMap) -> bool {
        match (&self.service_token, headers.get(SERVICE_TOKEN_HEADER)) {
            (Some(expected), Some(given)) => given.as_bytes() == expected.as_bytes(),
            _ => false,
        }
    }

    /// Caller identity, if any source yields one
    pub fn identify(&self, headers: &HeaderMap) -> Option<Identity> {
        if let Some(identity) = headers
            .get(USERINFO_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(decode_userinfo)
        {
            return Some(identity);
        }

        if let Some(token) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
        {
            match self.verify_jwt(token.trim()) {
                Ok(Some(identity)) => return Some(identity),
                Ok(None) => {}
                Err(e) => tracing::debug!("JWT rejected: {}", e),
            }
        }

        headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|user_id| Identity {
                user_id: user_id.to_string(),
                email: None,
                source: IdentitySource::Header,
            })
    }

    fn verify_jwt(&self, token: &str) -> Result<Option<Identity>, jsonwebtoken::errors::Error> {
        let claims = match &self.jwt_key {
            Some(key) => {
                let mut validation = Validation::new(Algorithm::RS256);
                validation.validate_aud = false;
                decode::<Claims>(token, key, &validation)?.claims
            }
            None if self.allow_insecure_jwt => {
                let mut validation = Validation::default();
                validation.insecure_disable_signature_validation();
                validation.validate_aud = false;
                validation.validate_exp = false;
                validation.required_spec_claims.clear();
                decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?.claims
            }
            None => return Ok(None),
        };
        Ok(claims.into_identity(IdentitySource::Jwt))
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl Claims {
    fn into_identity(self, source: IdentitySource) -> Option<Identity> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let email = non_empty(self.email);
        let user_id = non_empty(self.sub)
            .or_else(|| non_empty(self.id))
            .or_else(|| email.clone())?;
        Some(Identity {
            user_id,
            email,
            source,
        })
    }
}

/// Gateway userinfo: base64 (standard or URL-safe, padded or not) JSON
fn decode_userinfo(raw: &str) -> Option<Identity> {
    let raw = raw.trim();
    let bytes = [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(raw).ok())?;
    let value: Value = serde_json::from_slice(&bytes).ok()?;
    let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
    Claims {
        sub: field("sub"),
        id: field("id"),
        email: field("email"),
    }
    .into_identity(IdentitySource::Gateway)
}

// ============================================================================
// Extractors
// ============================================================================

/// Authenticated caller; 401 when no identity is present
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl AuthUser {
    pub fn user_id(&self) -> &str {
        &self.0.user_id
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AuthConfig>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Arc::<AuthConfig>::from_ref(state);
        config
            .identify(&parts.headers)
            .map(AuthUser)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Admin caller, or internal automation presenting the service token
#[derive(Debug, Clone)]
pub enum AdminUser {
    Admin(Identity),
    Service,
}

impl AdminUser {
    /// Id used for audit fields
    pub fn actor(&self) -> &str {
        match self {
            AdminUser::Admin(identity) => &identity.user_id,
            AdminUser::Service => "service",
        }
    }
}

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    Arc<AuthConfig>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Arc::<AuthConfig>::from_ref(state);
        if config.is_service_call(&parts.headers) {
            return Ok(AdminUser::Service);
        }
        let identity = config
            .identify(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        if !config.is_admin(&identity) {
            return Err(ApiError::forbidden("Admin access required"));
        }
        Ok(AdminUser::Admin(identity))
    }
}
