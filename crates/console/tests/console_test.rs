// Console routes against in-memory stores and mocked services

use std::sync::Arc;
use std::time::Duration;

use autoads_console::api::{self, AppState};
use autoads_console::config::{parse_services, ConsoleConfig};
use autoads_console::services::{AccountAdmin, AdscenterProxy, HealthProber, LimitsPolicyStore, SloCollector};
use autoads_core::ads::BulkOperation;
use autoads_core::console::{Role, UserRecord};
use autoads_core::events::TOKEN_GRANTED;
use autoads_core::memory::{InMemoryBus, InMemorySecrets, InMemoryStore};
use autoads_core::notification::{NewNotification, NotificationMessage, Severity};
use autoads_core::{BulkActionStore, EventRecorder, NotificationStore, SecretSource};
use autoads_server::AuthConfig;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Map, Value};
use tower::ServiceExt;
use wiremock::matchers::{header as header_eq, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ADMIN: &[(&str, &str)] = &[("x-user-id", "admin-1")];
const SERVICE_TOKEN: &str = "internal-secret";
const LIMITS_SECRET: &str = "adscenter-limits";

struct TestApp {
    router: Router,
    store: Arc<InMemoryStore>,
    secrets: Arc<InMemorySecrets>,
}

fn test_app(config: ConsoleConfig) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(InMemoryBus::new());
    let secrets = Arc::new(InMemorySecrets::new().with_secret(LIMITS_SECRET, r#"{"plans":{"FREE":{"rpm":10}}}"#));
    let recorder = EventRecorder::new(store.clone(), bus);
    let secret_source: Arc<dyn SecretSource> = secrets.clone();

    let router = api::routes(AppState {
        auth: Arc::new(
            AuthConfig::default()
                .with_admins(&[], &["admin-1"])
                .with_service_token(SERVICE_TOKEN),
        ),
        accounts: Arc::new(AccountAdmin::new(store.clone(), store.clone(), recorder)),
        console: store.clone(),
        events: store.clone(),
        notifications: store.clone(),
        slo: Arc::new(SloCollector::new(config.services.clone(), config.scrape_timeout)),
        health: Arc::new(HealthProber::new(config.services.clone(), config.probe_timeout)),
        limits: Arc::new(LimitsPolicyStore::new(Some(secret_source), Some(LIMITS_SECRET.into()))),
        adscenter: Arc::new(AdscenterProxy::new(config.adscenter_url.clone(), store.clone())),
    });
    TestApp { router, store, secrets }
}

async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<String>,
    headers: &[(&str, &str)],
) -> (StatusCode, String, Option<String>) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap(), content_type)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>, headers: &[(&str, &str)]) -> (StatusCode, Value) {
    let (status, text, _) = send_raw(app, method, uri, body.map(|b| b.to_string()), headers).await;
    (status, serde_json::from_str(&text).unwrap_or(Value::Null))
}

fn user(id: &str) -> UserRecord {
    UserRecord {
        id: id.into(),
        email: format!("{}@example.com", id),
        name: None,
        role: Role::User,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_console_is_admin_only() {
    let app = test_app(ConsoleConfig::default());

    let (status, _) = send(&app.router, "GET", "/api/v1/console/stats", None, &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app.router, "GET", "/api/v1/console/stats", None, &[("x-user-id", "u1")]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = send(
        &app.router,
        "GET",
        "/api/v1/console/stats",
        None,
        &[("x-service-token", SERVICE_TOKEN)],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_user_administration() {
    let app = test_app(ConsoleConfig::default());
    app.store.insert_user(user("u1"));

    let (status, body) = send(&app.router, "GET", "/api/v1/console/users?limit=10", None, ADMIN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["id"], "u1");

    let (status, body) = send(
        &app.router,
        "PUT",
        "/api/v1/console/users/u1/role",
        Some(json!({ "role": "admin" })),
        ADMIN,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "ADMIN");

    let (status, body) = send(
        &app.router,
        "PUT",
        "/api/v1/console/users/u1/role",
        Some(json!({ "role": "OWNER" })),
        ADMIN,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_ARGUMENT");

    let (status, _) = send(
        &app.router,
        "PUT",
        "/api/v1/console/users/ghost/role",
        Some(json!({ "role": "USER" })),
        ADMIN,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/console/users/u1/tokens",
        Some(json!({ "amount": 250, "reason": "onboarding" })),
        ADMIN,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 250);

    let (_, body) = send(&app.router, "GET", "/api/v1/console/users/u1/tokens", None, ADMIN).await;
    assert_eq!(body["balance"], 250);

    let (status, body) = send(
        &app.router,
        "PUT",
        "/api/v1/console/users/u1/subscription",
        Some(json!({ "plan": "PRO", "status": "active" })),
        ADMIN,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"], "PRO");
    assert!(body["currentPeriodEnd"].is_string());

    let (status, body) = send(
        &app.router,
        "GET",
        &format!("/api/v1/console/events?eventName={}", TOKEN_GRANTED),
        None,
        ADMIN,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["aggregateId"], "u1");

    let uri = format!("/api/v1/console/events/{}", items[0]["id"].as_str().unwrap());
    let (status, event) = send(&app.router, "GET", &uri, None, ADMIN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(event["eventName"], TOKEN_GRANTED);

    let (_, stats) = send(&app.router, "GET", "/api/v1/console/tokens/stats", None, ADMIN).await;
    assert_eq!(stats["totalBalance"], 250);
    assert_eq!(stats["usersWithBalance"], 1);
}

#[tokio::test]
async fn test_events_export_is_csv() {
    let app = test_app(ConsoleConfig::default());
    send(
        &app.router,
        "POST",
        "/api/v1/console/users/u1/tokens",
        Some(json!({ "amount": 5, "reason": "a, \"quoted\" reason" })),
        ADMIN,
    )
    .await;

    let (status, text, content_type) = send_raw(
        &app.router,
        "GET",
        "/api/v1/console/events/export?limit=99999",
        None,
        ADMIN,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/csv"));
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("id,eventName,aggregateType,aggregateId,userId,idempotencyKey,createdAt,payload")
    );
    let row = lines.next().unwrap();
    assert!(row.contains(",TokenGranted,token,u1,u1,,"));
    // The payload column is quoted with doubled quotes
    assert!(row.ends_with("}\""));
    assert!(row.contains(r#"\""quoted\"" reason"#));
}

#[tokio::test]
async fn test_slo_scrapes_services() {
    let service = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "http_requests_total{method=\"GET\",route=\"/a\",status=\"OK\"} 3\n\
             http_requests_total{method=\"GET\",route=\"/a\",status=\"INTERNAL\"} 1\n\
             http_request_duration_seconds_bucket{method=\"GET\",route=\"/a\",le=\"0.1\"} 2\n\
             http_request_duration_seconds_bucket{method=\"GET\",route=\"/a\",le=\"0.5\"} 4\n\
             http_request_duration_seconds_bucket{method=\"GET\",route=\"/a\",le=\"+Inf\"} 4\n",
        ))
        .mount(&service)
        .await;

    let config = ConsoleConfig::default().with_services(
        parse_services(&format!("siterank={},offline=http://127.0.0.1:1", service.uri())),
        None,
    );
    let app = test_app(config);
    let (status, body) = send(&app.router, "GET", "/api/v1/console/slo", None, ADMIN).await;
    assert_eq!(status, StatusCode::OK);

    let services = body["services"].as_array().unwrap();
    assert_eq!(services.len(), 2);
    assert_eq!(services[0]["service"], "siterank");
    assert_eq!(services[0]["reachable"], true);
    assert_eq!(services[0]["errorRate"], 0.25);
    // Rank 3.8 of 4 interpolates inside (0.1, 0.5]
    let p95 = services[0]["p95Seconds"].as_f64().unwrap();
    assert!((p95 - 0.46).abs() < 1e-9);

    assert_eq!(services[1]["service"], "offline");
    assert_eq!(services[1]["reachable"], false);
    assert!(services[1]["error"].is_string());
}

#[tokio::test]
async fn test_health_fan_out() {
    let ready = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/readyz"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&ready)
        .await;

    let alive = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/readyz"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&alive)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&alive)
        .await;

    let config = ConsoleConfig::default()
        .with_services(
            parse_services(&format!("offers={},siterank={}", ready.uri(), alive.uri())),
            None,
        );
    let app = test_app(config);
    let (status, body) = send(&app.router, "GET", "/api/health", None, ADMIN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["services"][0]["status"], "up");
    assert_eq!(body["services"][0]["code"], 200);
    assert_eq!(body["services"][1]["status"], "degraded");
    assert!(body["services"][1]["latency_ms"].is_u64());

    let down = ConsoleConfig {
        probe_timeout: Duration::from_millis(300),
        ..Default::default()
    }
    .with_services(parse_services("gone=http://127.0.0.1:1"), None);
    let app = test_app(down);
    let (_, body) = send(&app.router, "GET", "/api/health", None, ADMIN).await;
    assert_eq!(body["status"], "down");
    assert_eq!(body["services"][0]["code"], 0);
}

#[tokio::test]
async fn test_bulk_action_proxy_acts_as_owner() {
    let adscenter = MockServer::start().await;
    let config = ConsoleConfig::default().with_services(Vec::new(), Some(adscenter.uri()));
    let app = test_app(config);

    let operation = BulkOperation::new("owner-7", Vec::new(), true);
    app.store.create_operation(&operation).await.unwrap();

    Mock::given(method("GET"))
        .and(path(format!("/api/v1/adscenter/bulk-actions/{}/snapshots", operation.id)))
        .and(header_eq("x-user-id", "owner-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [{ "stage": "before" }] })))
        .expect(1)
        .mount(&adscenter)
        .await;
    Mock::given(method("POST"))
        .and(path(format!(
            "/api/v1/adscenter/bulk-actions/{}/deadletters/retry-batch",
            operation.id
        )))
        .and(header_eq("x-user-id", "owner-7"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({ "error": { "code": "CONFLICT" } })))
        .mount(&adscenter)
        .await;

    let uri = format!("/api/v1/console/adscenter/bulk-actions/{}/snapshots", operation.id);
    let (status, body) = send(&app.router, "GET", &uri, None, ADMIN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["stage"], "before");

    let uri = format!("/api/v1/console/adscenter/bulk-actions/{}/deadletters/retry-batch", operation.id);
    let (status, body) = send(&app.router, "POST", &uri, None, ADMIN).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let unknown = format!("/api/v1/console/adscenter/bulk-actions/{}/snapshots", uuid::Uuid::now_v7());
    let (status, _) = send(&app.router, "GET", &unknown, None, ADMIN).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        "GET",
        "/api/v1/console/adscenter/bulk-actions/not-a-uuid/snapshots",
        None,
        ADMIN,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_limits_policy_versions() {
    let app = test_app(ConsoleConfig::default());

    let (status, body) = send(&app.router, "GET", "/api/v1/console/limits/policy", None, ADMIN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["policy"]["plans"]["FREE"]["rpm"], 10);

    let (status, body) = send(
        &app.router,
        "PUT",
        "/api/v1/console/limits/policy",
        Some(json!({ "plans": { "FREE": { "rpm": 20 } } })),
        ADMIN,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["secret"], LIMITS_SECRET);
    assert_eq!(app.secrets.version_count(LIMITS_SECRET), 2);

    let (_, body) = send(&app.router, "GET", "/api/v1/console/limits/policy", None, ADMIN).await;
    assert_eq!(body["policy"]["plans"]["FREE"]["rpm"], 20);
}

#[tokio::test]
async fn test_config_and_alerts() {
    let app = test_app(ConsoleConfig::default());

    let (status, _) = send(&app.router, "GET", "/api/v1/console/config/banner", None, ADMIN).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(
        &app.router,
        "PUT",
        "/api/v1/console/config/banner",
        Some(json!({ "text": "maintenance at 02:00" })),
        ADMIN,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&app.router, "GET", "/api/v1/console/config/banner", None, ADMIN).await;
    assert_eq!(body["value"]["text"], "maintenance at 02:00");
    let (status, _) = send(&app.router, "PUT", "/api/v1/console/config/bad%20key", Some(json!(1)), ADMIN).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for (user_id, severity) in [("u1", Severity::Info), ("u2", Severity::Warn), ("u3", Severity::Error)] {
        app.store
            .insert_notification(&NewNotification {
                user_id: user_id.into(),
                notification_type: "bulk".into(),
                title: "Bulk action".into(),
                message: NotificationMessage {
                    severity,
                    category: "bulk".into(),
                    summary: "done".into(),
                    extra: Map::new(),
                },
            })
            .await
            .unwrap();
    }

    let (status, body) = send(&app.router, "GET", "/api/v1/console/alerts", None, ADMIN).await;
    assert_eq!(status, StatusCode::OK);
    let users: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["userId"].as_str().unwrap())
        .collect();
    assert_eq!(users.len(), 2);
    assert!(!users.contains(&"u1"));

    let (_, body) = send(&app.router, "GET", "/api/v1/console/alerts?severity=error", None, ADMIN).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    let (status, _) = send(&app.router, "GET", "/api/v1/console/alerts?severity=info", None, ADMIN).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app.router, "GET", "/api/v1/console/incidents?days=1", None, ADMIN).await;
    assert_eq!(status, StatusCode::OK);
    let total: i64 = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["count"].as_i64().unwrap())
        .sum();
    assert_eq!(total, 2);
}
