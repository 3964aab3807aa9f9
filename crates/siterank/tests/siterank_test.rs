// Siterank flows through the public router against a mocked upstream

use std::sync::Arc;
use std::time::Duration;

use autoads_core::events::{SITERANK_COMPLETED, SITERANK_REQUESTED};
use autoads_core::memory::{InMemoryBus, InMemoryStore};
use autoads_core::offer::Offer;
use autoads_core::ratelimit::RetryPolicy;
use autoads_core::{DomainCacheStore, EventRecorder, OfferStore};
use autoads_server::AuthConfig;
use autoads_siterank::api::{self, AppState};
use autoads_siterank::services::{Analyzer, DomainCache};
use autoads_siterank::traffic::SimilarWebClient;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestApp {
    router: Router,
    store: Arc<InMemoryStore>,
    bus: Arc<InMemoryBus>,
}

async fn test_app(upstream: &MockServer) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(InMemoryBus::new());
    for (id, owner, url) in [
        ("offer1", "u1", "https://foo.com"),
        ("offer2", "u1", "https://foo.com/other-landing"),
        ("o1", "u1", "https://bar.com"),
        ("secret-offer", "alice", "https://alice-private.com"),
    ] {
        store
            .create_offer(&Offer {
                id: id.into(),
                user_id: owner.into(),
                name: None,
                url: url.into(),
                status: Offer::STATUS_ACTIVE.into(),
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
    }

    let source = SimilarWebClient::new(
        &format!("{}/v1/website/%s/total-traffic-and-engagement/visits", upstream.uri()),
        Duration::from_secs(15),
    );
    let analyzer = Arc::new(Analyzer::new(
        store.clone(),
        store.clone(),
        DomainCache::new(store.clone()),
        Some(Arc::new(source)),
        EventRecorder::new(store.clone(), bus.clone()),
        RetryPolicy::no_retry(),
    ));
    let router = api::routes(AppState {
        auth: Arc::new(AuthConfig::default()),
        analyzer,
        idempotency: store.clone(),
    });
    TestApp { router, store, bus }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>, key: Option<&str>) -> (StatusCode, Value) {
    send_as(app, "u1", method, uri, body, key).await
}

async fn send_as(
    app: &Router,
    user: &str,
    method: &str,
    uri: &str,
    body: Option<Value>,
    key: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", user)
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("x-idempotency-key", key);
    }
    let request = builder
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn wait_terminal(app: &Router, offer_id: &str) -> Value {
    for _ in 0..100 {
        let (status, body) = send(app, "GET", &format!("/api/v1/siterank/{}", offer_id), None, None).await;
        if status == StatusCode::OK && (body["status"] == "completed" || body["status"] == "failed") {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("analysis for {} did not finish", offer_id);
}

#[tokio::test]
async fn test_second_offer_on_same_host_hits_cache() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/website/foo.com/total-traffic-and-engagement/visits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "visits": [{ "date": "2026-09-01", "visits": 1200 }] })))
        .expect(1)
        .mount(&upstream)
        .await;
    let app = test_app(&upstream).await;

    let (status, first) = send(&app.router, "POST", "/api/v1/siterank/analyze", Some(json!({ "offerId": "offer1" })), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["status"], "pending");
    let done = wait_terminal(&app.router, "offer1").await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["result"]["cacheHit"], false);

    let cached = app.store.get_domain("foo.com").await.unwrap().unwrap();
    assert!(cached.ok);
    assert_eq!(cached.expires_at - cached.updated_at, chrono::Duration::days(7));

    let (status, _) = send(&app.router, "POST", "/api/v1/siterank/analyze", Some(json!({ "offerId": "offer2" })), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let done = wait_terminal(&app.router, "offer2").await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["result"]["traffic"]["visits"][0]["visits"], 1200);

    let completed = app.bus.published_of(SITERANK_COMPLETED);
    assert_eq!(completed.len(), 2);
    assert_eq!(completed[1].data["offerId"], "offer2");
    assert_eq!(completed[1].data["cacheHit"], true);
    assert_eq!(app.bus.published_of(SITERANK_REQUESTED).len(), 2);
    // MockServer verifies the single upstream call on drop
}

#[tokio::test]
async fn test_idempotent_analyze_and_conflict_without_key() {
    let upstream = MockServer::start().await;
    // Slow upstream keeps the first analysis active
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "visits": [] }))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&upstream)
        .await;
    let app = test_app(&upstream).await;

    let body = json!({ "offerId": "o1" });
    let (status, first) = send(&app.router, "POST", "/api/v1/siterank/analyze", Some(body.clone()), Some("analyze-o1")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, second) = send(&app.router, "POST", "/api/v1/siterank/analyze", Some(body.clone()), Some("analyze-o1")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["id"], second["id"]);

    let (status, conflict) = send(&app.router, "POST", "/api/v1/siterank/analyze", Some(body.clone()), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["error"]["code"], "ALREADY_EXISTS");

    // A fresh key while the analysis is active binds to it instead of conflicting
    let (status, rebound) = send(&app.router, "POST", "/api/v1/siterank/analyze", Some(body), Some("analyze-o1-retry")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(rebound["id"], first["id"]);

    let done = wait_terminal(&app.router, "o1").await;
    assert_eq!(done["id"], first["id"]);
    assert_eq!(done["status"], "completed");
}

#[tokio::test]
async fn test_upstream_failure_marks_failed_and_caches_for_a_day() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(1)
        .mount(&upstream)
        .await;
    let app = test_app(&upstream).await;

    send(&app.router, "POST", "/api/v1/siterank/analyze", Some(json!({ "offerId": "offer1" })), None).await;
    let done = wait_terminal(&app.router, "offer1").await;
    assert_eq!(done["status"], "failed");
    assert!(done["error"].as_str().unwrap().contains("503"));

    let cached = app.store.get_domain("foo.com").await.unwrap().unwrap();
    assert!(!cached.ok);
    assert_eq!(cached.expires_at - cached.updated_at, chrono::Duration::days(1));

    let completed = app.bus.published_of(SITERANK_COMPLETED);
    assert_eq!(completed[0].data["status"], "failed");
}

#[tokio::test]
async fn test_analyze_of_another_users_offer_is_not_found() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "visits": 999 })))
        .mount(&upstream)
        .await;
    let app = test_app(&upstream).await;
    let body = json!({ "offerId": "secret-offer" });

    let (status, err) = send_as(&app.router, "bob", "POST", "/api/v1/siterank/analyze", Some(body.clone()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["error"]["code"], "NOT_FOUND");

    let (status, _) = send_as(&app.router, "bob", "GET", "/api/v1/siterank/secret-offer", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.bus.published_of(SITERANK_REQUESTED).is_empty());

    // The owner is unaffected
    let (status, _) = send_as(&app.router, "alice", "POST", "/api/v1/siterank/analyze", Some(body), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_malformed_body_gets_unified_invalid_argument() {
    let upstream = MockServer::start().await;
    let app = test_app(&upstream).await;

    let (status, err) = send(&app.router, "POST", "/api/v1/siterank/analyze", Some(json!({ "offerId": 5 })), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"]["code"], "INVALID_ARGUMENT");
    assert!(err["error"]["details"]["reason"].is_string());

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/siterank/analyze")
        .header("x-user-id", "u1")
        .header("content-type", "application/json")
        .body(Body::from("{\"offerId\":"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let err: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(err["error"]["code"], "INVALID_ARGUMENT");
    assert!(app.bus.published_of(SITERANK_REQUESTED).is_empty());
}
