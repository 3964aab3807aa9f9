// Firestore recent-events cache for the UI

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autoads_core::{UiDocStore, UpstreamError};
use serde_json::{json, Map, Value};
use tracing::instrument;

use crate::error::{check_status, CloudError};
use crate::token::TokenProvider;

pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

/// Convert plain JSON into Firestore's typed value representation
pub fn to_firestore_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(to_firestore_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": to_fields(map) } }),
    }
}

fn to_fields(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), to_firestore_value(v)))
        .collect()
}

pub struct FirestoreDocs {
    http: reqwest::Client,
    base_url: String,
    documents_path: String,
    tokens: Arc<TokenProvider>,
}

impl FirestoreDocs {
    pub fn new(base_url: &str, project: &str, tokens: Arc<TokenProvider>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            documents_path: format!("projects/{}/databases/(default)/documents", project),
            tokens,
        }
    }

    /// Enabled by `FIRESTORE_ENABLED=true`; honours `FIRESTORE_EMULATOR_HOST`
    pub fn from_env() -> Option<Self> {
        let enabled = std::env::var("FIRESTORE_ENABLED")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);
        if !enabled {
            return None;
        }
        let project = std::env::var("GOOGLE_CLOUD_PROJECT")
            .ok()
            .filter(|p| !p.is_empty())?;

        Some(match std::env::var("FIRESTORE_EMULATOR_HOST") {
            Ok(host) if !host.is_empty() => Self::new(
                &format!("http://{}/v1", host),
                &project,
                Arc::new(TokenProvider::anonymous()),
            ),
            _ => Self::new(
                DEFAULT_FIRESTORE_URL,
                &project,
                Arc::new(TokenProvider::from_env()),
            ),
        })
    }
}

#[async_trait]
impl UiDocStore for FirestoreDocs {
    #[instrument(skip(self, doc))]
    async fn put_recent_event(&self, user_id: &str, event_id: &str, doc: &Value) -> Result<(), UpstreamError> {
        let url = format!(
            "{}/{}/users/{}/recentEvents/{}",
            self.base_url, self.documents_path, user_id, event_id
        );
        let fields = match doc {
            Value::Object(map) => to_fields(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), to_firestore_value(other));
                map
            }
        };

        let request = self
            .tokens
            .authorize(self.http.patch(&url).json(&json!({ "fields": fields })))
            .await?;
        let response = request.send().await.map_err(CloudError::from)?;
        check_status(response, &url).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_value_conversion() {
        let converted = to_firestore_value(&json!({
            "n": 3,
            "f": 1.5,
            "ok": true,
            "tags": ["a"],
            "none": null
        }));
        let fields = &converted["mapValue"]["fields"];
        assert_eq!(fields["n"], json!({ "integerValue": "3" }));
        assert_eq!(fields["f"], json!({ "doubleValue": 1.5 }));
        assert_eq!(fields["ok"], json!({ "booleanValue": true }));
        assert_eq!(
            fields["tags"],
            json!({ "arrayValue": { "values": [{ "stringValue": "a" }] } })
        );
        assert_eq!(fields["none"], json!({ "nullValue": null }));
    }

    #[tokio::test]
    async fn test_put_recent_event_patches_document() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(
                "/projects/p/databases/(default)/documents/users/u1/recentEvents/e1",
            ))
            .and(body_json(json!({
                "fields": { "type": { "stringValue": "SiterankCompleted" } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let docs = FirestoreDocs::new(&server.uri(), "p", Arc::new(TokenProvider::anonymous()));
        docs.put_recent_event("u1", "e1", &json!({ "type": "SiterankCompleted" }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_recent_event_maps_errors() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let docs = FirestoreDocs::new(&server.uri(), "p", Arc::new(TokenProvider::anonymous()));
        let err = docs
            .put_recent_event("u1", "e1", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Http { status: 403, .. }));
    }
}
