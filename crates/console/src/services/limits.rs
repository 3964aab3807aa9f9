// Adscenter limits policy kept in a versioned secret

use std::sync::Arc;

use autoads_core::SecretSource;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LimitsPolicy {
    pub secret: String,
    /// Parsed JSON, or the raw text when the version is not JSON
    #[schema(value_type = Object)]
    pub policy: Value,
}

pub struct LimitsPolicyStore {
    secrets: Option<Arc<dyn SecretSource>>,
    name: Option<String>,
}

fn decode(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

impl LimitsPolicyStore {
    pub fn new(secrets: Option<Arc<dyn SecretSource>>, name: Option<String>) -> Self {
        Self { secrets, name }
    }

    fn target(&self) -> ServiceResult<(&Arc<dyn SecretSource>, &str)> {
        match (&self.secrets, self.name.as_deref()) {
            (Some(secrets), Some(name)) => Ok((secrets, name)),
            (None, _) => Err(ServiceError::NotConfigured("Secret Manager is not configured".into())),
            (_, None) => Err(ServiceError::NotConfigured("ADSCENTER_LIMITS_SECRET is not set".into())),
        }
    }

    /// Latest secret version
    pub async fn get(&self) -> ServiceResult<LimitsPolicy> {
        let (secrets, name) = self.target()?;
        let raw = secrets.access(name).await?;
        Ok(LimitsPolicy {
            secret: name.to_string(),
            policy: decode(raw),
        })
    }

    /// Append a version; JSON bodies are stored compacted, anything else as text
    pub async fn put(&self, body: &[u8]) -> ServiceResult<LimitsPolicy> {
        let (secrets, name) = self.target()?;
        let text = std::str::from_utf8(body)
            .map_err(|_| ServiceError::InvalidArgument("policy must be UTF-8".into()))?
            .trim();
        if text.is_empty() {
            return Err(ServiceError::InvalidArgument("policy body is empty".into()));
        }
        let payload = match serde_json::from_str::<Value>(text) {
            Ok(json) => json.to_string(),
            Err(_) => text.to_string(),
        };
        secrets.add_version(name, &payload).await?;
        tracing::info!(secret = name, bytes = payload.len(), "Limits policy version added");
        Ok(LimitsPolicy {
            secret: name.to_string(),
            policy: decode(payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoads_core::memory::InMemorySecrets;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_appends_version() {
        let secrets = Arc::new(InMemorySecrets::new().with_secret("limits", r#"{"plans":{}}"#));
        let store = LimitsPolicyStore::new(Some(secrets.clone()), Some("limits".into()));

        assert_eq!(store.get().await.unwrap().policy, json!({ "plans": {} }));

        let written = store.put(br#" { "plans": { "PRO": { "rpm": 120 } } } "#).await.unwrap();
        assert_eq!(written.policy["plans"]["PRO"]["rpm"], 120);
        assert_eq!(secrets.version_count("limits"), 2);

        store.put(b"rpm=30").await.unwrap();
        assert_eq!(store.get().await.unwrap().policy, json!("rpm=30"));
    }

    #[tokio::test]
    async fn test_unconfigured_and_empty() {
        let store = LimitsPolicyStore::new(None, Some("limits".into()));
        assert!(matches!(store.get().await, Err(ServiceError::NotConfigured(_))));

        let store = LimitsPolicyStore::new(Some(Arc::new(InMemorySecrets::new())), Some("limits".into()));
        assert!(matches!(store.put(b"  ").await, Err(ServiceError::InvalidArgument(_))));
    }
}
