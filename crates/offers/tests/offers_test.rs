// Offer intake and billing through the public router

use std::sync::Arc;

use autoads_core::console::token_kind;
use autoads_core::events::{OFFER_CREATED, TOKEN_RESERVED};
use autoads_core::memory::{InMemoryBus, InMemoryStore};
use autoads_core::{EventRecorder, TokenLedger};
use autoads_offers::api::{self, AppState};
use autoads_offers::services::{Billing, OfferService};
use autoads_server::AuthConfig;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    bus: Arc<InMemoryBus>,
}

async fn test_app(balance: i64) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    store.apply("u1", balance, token_kind::GRANT, None, None).await.unwrap();
    let bus = Arc::new(InMemoryBus::new());
    let recorder = EventRecorder::new(store.clone(), bus.clone());
    let router = api::routes(AppState {
        auth: Arc::new(AuthConfig::default()),
        offers: Arc::new(OfferService::new(store.clone(), recorder.clone())),
        billing: Arc::new(Billing::new(store.clone(), recorder)),
        idempotency: store,
    });
    TestApp { router, bus }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>, key: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", "u1")
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

#[tokio::test]
async fn test_offer_create_is_idempotent() {
    let app = test_app(0).await;
    let body = json!({ "name": "Spring", "url": "https://foo.com/landing" });

    let (status, first) = send(&app.router, "POST", "/api/v1/offers", Some(body.clone()), Some("offer-1")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, second) = send(&app.router, "POST", "/api/v1/offers", Some(body), Some("offer-1")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["id"], second["id"]);
    assert_eq!(app.bus.published_of(OFFER_CREATED).len(), 1);

    let uri = format!("/api/v1/offers/{}", first["id"].as_str().unwrap());
    let (status, fetched) = send(&app.router, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["url"], "https://foo.com/landing");
}

#[tokio::test]
async fn test_offer_url_is_validated() {
    let app = test_app(0).await;
    let (status, body) = send(&app.router, "POST", "/api/v1/offers", Some(json!({ "url": "foo.com" })), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_reserve_replay_charges_once() {
    let app = test_app(50).await;
    let body = json!({ "amount": 20, "reason": "siterank" });

    let (status, first) = send(&app.router, "POST", "/api/v1/billing/tokens/reserve", Some(body.clone()), Some("r-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["balance"], 30);
    let (_, replay) = send(&app.router, "POST", "/api/v1/billing/tokens/reserve", Some(body), Some("r-1")).await;
    assert_eq!(replay["reservationId"], first["reservationId"]);
    assert_eq!(replay["balance"], 30);
    assert_eq!(replay["replayed"], true);
    assert_eq!(app.bus.published_of(TOKEN_RESERVED).len(), 1);

    let (status, reverted) = send(
        &app.router,
        "POST",
        "/api/v1/billing/tokens/revert",
        Some(json!({ "amount": 20, "reservationId": first["reservationId"] })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reverted["balance"], 50);

    let (_, balance) = send(&app.router, "GET", "/api/v1/billing/tokens", None, None).await;
    assert_eq!(balance["balance"], 50);
}

#[tokio::test]
async fn test_overdraft_is_conflict() {
    let app = test_app(5).await;
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/billing/tokens/debit",
        Some(json!({ "amount": 6 })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}
