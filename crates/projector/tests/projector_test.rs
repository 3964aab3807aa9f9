// Push delivery into the projection read model

use std::sync::Arc;

use autoads_core::events::{EventData, TokenData};
use autoads_core::memory::{InMemoryStore, InMemoryUiDocs};
use autoads_core::Envelope;
use autoads_projector::api::{self, AppState};
use autoads_projector::Projector;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::{json, Map, Value};
use tower::ServiceExt;

fn app(store: Arc<InMemoryStore>, docs: Arc<InMemoryUiDocs>) -> Router {
    api::routes(AppState {
        projector: Arc::new(Projector::new(store, Some(docs))),
    })
}

fn debited(user_id: &str) -> Envelope {
    Envelope::new(
        "billing",
        EventData::TokenDebited(TokenData {
            user_id: user_id.into(),
            amount: 5,
            reservation_id: Some("r1".into()),
            reason: Some("siterank".into()),
            extra: Map::new(),
        }),
    )
}

fn push_body(envelope: &Envelope) -> Value {
    json!({
        "message": {
            "data": STANDARD.encode(serde_json::to_vec(envelope).unwrap()),
            "attributes": envelope.attributes(None),
            "messageId": "m-1"
        },
        "subscription": "projects/p/subscriptions/projector"
    })
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_duplicate_push_is_success() {
    let store = Arc::new(InMemoryStore::new());
    let docs = Arc::new(InMemoryUiDocs::new());
    let app = app(store.clone(), docs.clone());
    let envelope = debited("u1");

    let (status, _) = post(&app, "/push", push_body(&envelope)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = post(&app, "/api/v1/projector/push", push_body(&envelope)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(store.projection_count(), 1);
    let mirrored = docs.docs();
    assert_eq!(mirrored.len(), 1);
    assert_eq!(mirrored[0].0, "u1");
    assert_eq!(mirrored[0].2["data"]["amount"], 5);
}

#[tokio::test]
async fn test_bad_payload_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let app = app(store.clone(), Arc::new(InMemoryUiDocs::new()));

    let (status, body) = post(&app, "/push", json!({ "message": { "data": "%%% not base64" } })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_ARGUMENT");

    let (status, _) = post(&app, "/push", json!({ "subscription": "s" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(store.projection_count(), 0);
}

#[tokio::test]
async fn test_untyped_message_is_acked_without_projection() {
    let store = Arc::new(InMemoryStore::new());
    let docs = Arc::new(InMemoryUiDocs::new());
    let app = app(store.clone(), docs.clone());

    // Decodes, but names no event type; a 4xx here would be redelivered forever
    let untyped = json!({
        "message": { "data": STANDARD.encode(br#"{"hello":"world"}"#), "messageId": "m-untyped" },
        "subscription": "projects/p/subscriptions/projector"
    });
    for _ in 0..2 {
        let (status, _) = post(&app, "/push", untyped.clone()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    assert_eq!(store.projection_count(), 0);
    assert!(docs.docs().is_empty());
}
