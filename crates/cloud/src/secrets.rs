// Secret Manager access
//
// SecretManagerClient speaks the REST API. SecretCache wraps any SecretSource
// with a TTL cache and the stack-suffixed lookup (`name-<stack>` first).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autoads_core::{SecretError, SecretSource};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use moka::sync::Cache;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::error::{check_status, CloudError};
use crate::token::TokenProvider;

pub const DEFAULT_SECRET_MANAGER_URL: &str = "https://secretmanager.googleapis.com/v1";
pub const DEFAULT_CACHE_TTL_MS: u64 = 600_000;
const SECRET_CACHE_CAPACITY: u64 = 256;

#[derive(Deserialize)]
struct AccessResponse {
    payload: Payload,
}

#[derive(Deserialize)]
struct Payload {
    #[serde(default)]
    data: String,
}

pub struct SecretManagerClient {
    http: reqwest::Client,
    base_url: String,
    project: String,
    tokens: Arc<TokenProvider>,
}

impl SecretManagerClient {
    pub fn new(base_url: &str, project: impl Into<String>, tokens: Arc<TokenProvider>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            project: project.into(),
            tokens,
        }
    }

    /// Requires `GOOGLE_CLOUD_PROJECT`; `SECRET_MANAGER_URL` overrides the endpoint
    pub fn from_env(tokens: Arc<TokenProvider>) -> Result<Self, SecretError> {
        let project = std::env::var("GOOGLE_CLOUD_PROJECT")
            .ok()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| SecretError::Client("GOOGLE_CLOUD_PROJECT is not set".into()))?;
        let base_url = std::env::var("SECRET_MANAGER_URL")
            .unwrap_or_else(|_| DEFAULT_SECRET_MANAGER_URL.to_string());
        Ok(Self::new(&base_url, project, tokens))
    }

    /// Full resource path of a secret; accepts bare names and `projects/...` paths
    fn secret_path(&self, name: &str) -> String {
        let name = name.split("/versions/").next().unwrap_or(name);
        if name.starts_with("projects/") {
            name.to_string()
        } else {
            format!("projects/{}/secrets/{}", self.project, name)
        }
    }
}

#[async_trait]
impl SecretSource for SecretManagerClient {
    #[instrument(skip(self))]
    async fn access(&self, name: &str) -> Result<String, SecretError> {
        let url = format!(
            "{}/{}/versions/latest:access",
            self.base_url,
            self.secret_path(name)
        );
        let request = self.tokens.authorize(self.http.get(&url)).await?;
        let response = request.send().await.map_err(CloudError::from)?;
        let response = check_status(response, name).await?;
        let body: AccessResponse = response.json().await.map_err(CloudError::from)?;

        let bytes = STANDARD
            .decode(body.payload.data.as_bytes())
            .map_err(|e| SecretError::Access(format!("payload is not base64: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|_| SecretError::Access(format!("secret {} is not UTF-8", name)))
    }

    #[instrument(skip(self, payload))]
    async fn add_version(&self, name: &str, payload: &str) -> Result<(), SecretError> {
        let url = format!("{}/{}:addVersion", self.base_url, self.secret_path(name));
        let body = json!({ "payload": { "data": STANDARD.encode(payload.as_bytes()) } });
        let request = self.tokens.authorize(self.http.post(&url).json(&body)).await?;
        let response = request.send().await.map_err(CloudError::from)?;
        check_status(response, name).await?;
        Ok(())
    }
}

/// TTL cache over a secret source
pub struct SecretCache {
    source: Arc<dyn SecretSource>,
    stack: Option<String>,
    // None when the TTL is zero: every read goes to the source
    entries: Option<Cache<String, String>>,
}

impl SecretCache {
    pub fn new(source: Arc<dyn SecretSource>, ttl: Duration, stack: Option<String>) -> Self {
        let entries = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(SECRET_CACHE_CAPACITY)
                .time_to_live(ttl)
                .build()
        });
        Self {
            source,
            stack: stack.filter(|s| !s.is_empty()),
            entries,
        }
    }

    /// TTL from `SECRET_CACHE_TTL_MS`, stack suffix from `STACK`
    pub fn from_env(source: Arc<dyn SecretSource>) -> Self {
        let ttl_ms = std::env::var("SECRET_CACHE_TTL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CACHE_TTL_MS);
        Self::new(source, Duration::from_millis(ttl_ms), std::env::var("STACK").ok())
    }

    /// Cached value, else `name-<stack>`, else `name`
    pub async fn get(&self, name: &str) -> Result<String, SecretError> {
        if let Some(value) = self.entries.as_ref().and_then(|entries| entries.get(name)) {
            return Ok(value);
        }

        let value = match &self.stack {
            Some(stack) => match self.source.access(&format!("{}-{}", name, stack)).await {
                Ok(value) => value,
                Err(SecretError::NotFound(_)) => {
                    debug!(secret = name, stack = %stack, "Stack secret missing, using base name");
                    self.source.access(name).await?
                }
                Err(e) => return Err(e),
            },
            None => self.source.access(name).await?,
        };

        if let Some(entries) = &self.entries {
            entries.insert(name.to_string(), value.clone());
        }
        Ok(value)
    }

    pub fn invalidate(&self, name: &str) {
        if let Some(entries) = &self.entries {
            entries.invalidate(name);
        }
    }

    /// Append a version and drop the cached value
    pub async fn put(&self, name: &str, payload: &str) -> Result<(), SecretError> {
        self.source.add_version(name, payload).await?;
        self.invalidate(name);
        Ok(())
    }
}

#[async_trait]
impl SecretSource for SecretCache {
    async fn access(&self, name: &str) -> Result<String, SecretError> {
        self.get(name).await
    }

    async fn add_version(&self, name: &str, payload: &str) -> Result<(), SecretError> {
        self.put(name, payload).await
    }
}

/// Value of `key` from the environment, else from the secret named by `<key>_SECRET_NAME`
pub async fn env_or_secret(
    secrets: Option<&SecretCache>,
    key: &str,
) -> Result<Option<String>, SecretError> {
    if let Ok(value) = std::env::var(key) {
        if !value.trim().is_empty() {
            return Ok(Some(value));
        }
    }

    let secret_name = match std::env::var(format!("{}_SECRET_NAME", key)) {
        Ok(name) if !name.trim().is_empty() => name,
        _ => return Ok(None),
    };

    match secrets {
        Some(cache) => cache.get(secret_name.trim()).await.map(|v| Some(v.trim().to_string())),
        None => Err(SecretError::Client(format!(
            "{}_SECRET_NAME is set but no secret store is configured",
            key
        ))),
    }
}
