// Idempotency key extraction and the lookup-then-bind helpers

use std::sync::Arc;

use autoads_core::idempotency::{default_ttl, IdempotencyBinding, IdempotencyKey, HEADER};
use autoads_core::{IdempotencyStore, StoreResult};
use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

/// Validated `X-Idempotency-Key`; invalid values are dropped, never rejected
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Idempotency(pub Option<IdempotencyKey>);

impl Idempotency {
    pub fn key(&self) -> Option<&IdempotencyKey> {
        self.0.as_ref()
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_ref().map(IdempotencyKey::as_str)
    }
}

impl<S> FromRequestParts<S> for Idempotency
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| {
                let parsed = IdempotencyKey::parse(raw);
                if parsed.is_none() {
                    tracing::debug!("Dropping invalid idempotency key");
                }
                parsed
            });
        Ok(Idempotency(key))
    }
}

/// Target previously bound to the key, if any
pub async fn lookup(
    store: &Arc<dyn IdempotencyStore>,
    key: Option<&IdempotencyKey>,
    user_id: &str,
    scope: &str,
) -> StoreResult<Option<String>> {
    match key {
        Some(key) => store.lookup(key.as_str(), user_id, scope).await,
        None => Ok(None),
    }
}

/// Bind the key to a freshly created target. Failures are logged: the target exists either way.
pub async fn bind(
    store: &Arc<dyn IdempotencyStore>,
    key: Option<&IdempotencyKey>,
    user_id: &str,
    scope: &str,
    target_id: &str,
) {
    let Some(key) = key else {
        return;
    };
    let binding = IdempotencyBinding::new(key, user_id, scope, target_id, default_ttl());
    if let Err(e) = store.bind(&binding).await {
        tracing::warn!(scope = scope, "Failed to bind idempotency key: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoads_core::memory::InMemoryStore;
    use axum::http::Request;

    async fn extract(value: Option<&str>) -> Idempotency {
        let mut builder = Request::builder().uri("/");
        if let Some(v) = value {
            builder = builder.header(HEADER, v);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Idempotency::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_boundary_lengths() {
        let ok = "k".repeat(128);
        assert_eq!(extract(Some(&ok)).await.as_str(), Some(ok.as_str()));
        assert!(extract(Some(&"k".repeat(129))).await.0.is_none());
        assert!(extract(Some("has space")).await.0.is_none());
        assert!(extract(None).await.0.is_none());
    }

    #[tokio::test]
    async fn test_lookup_then_bind() {
        let store: Arc<dyn IdempotencyStore> = Arc::new(InMemoryStore::new());
        let key = IdempotencyKey::parse("k-1").unwrap();

        assert!(lookup(&store, Some(&key), "u1", "s").await.unwrap().is_none());
        bind(&store, Some(&key), "u1", "s", "target-1").await;
        assert_eq!(
            lookup(&store, Some(&key), "u1", "s").await.unwrap().as_deref(),
            Some("target-1")
        );
        // Scoped per user
        assert!(lookup(&store, Some(&key), "u2", "s").await.unwrap().is_none());
        assert!(lookup(&store, None, "u1", "s").await.unwrap().is_none());
    }
}
