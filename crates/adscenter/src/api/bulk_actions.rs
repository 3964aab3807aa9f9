// Bulk action routes: submit, inspect, and retry dead letters

use autoads_core::ads::{ActionType, BulkAction, BulkOperation, BulkStatus, DeadLetter, Snapshot};
use autoads_core::idempotency::scope;
use autoads_core::ratelimit::ActionKind;
use autoads_server::{idempotency, ApiError, AuthUser, ErrorBody, Idempotency, Json};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::AppState;
use crate::services::RetryBatchResult;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBulkRequest {
    pub actions: Vec<BulkAction>,
    /// Forces validate-only even when live mutation is enabled
    #[serde(default)]
    pub validate_only: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBulkResponse {
    pub operation_id: Uuid,
    pub status: BulkStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SnapshotList {
    pub items: Vec<Snapshot>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeadLetterList {
    pub items: Vec<DeadLetter>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryBatchRequest {
    #[serde(default)]
    pub action_type: Option<ActionType>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bulk-actions", post(submit))
        .route("/bulk-actions/{id}", get(get_operation))
        .route("/bulk-actions/{id}/snapshots", get(list_snapshots))
        .route("/bulk-actions/{id}/deadletters", get(list_dead_letters))
        .route("/bulk-actions/{id}/deadletters/retry-batch", post(retry_batch))
        .route("/bulk-actions/{id}/deadletters/{dl_id}/retry", post(retry_dead_letter))
}

/// POST /api/v1/adscenter/bulk-actions - Queue a bulk operation
#[utoipa::path(
    post,
    path = "/api/v1/adscenter/bulk-actions",
    request_body = SubmitBulkRequest,
    params(
        ("X-Idempotency-Key" = Option<String>, Header, description = "Replays return the first operation")
    ),
    responses(
        (status = 202, description = "Operation queued", body = SubmitBulkResponse),
        (status = 400, description = "Invalid action", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn submit(
    State(state): State<AppState>,
    user: AuthUser,
    idem: Idempotency,
    Json(req): Json<SubmitBulkRequest>,
) -> Result<(StatusCode, Json<SubmitBulkResponse>), ApiError> {
    let user_id = user.user_id();

    if let Some(target) =
        idempotency::lookup(&state.idempotency, idem.key(), user_id, scope::BULK_ACTIONS_CREATE).await?
    {
        if let Ok(id) = target.parse::<Uuid>() {
            if let Ok(existing) = state.executor.get_owned(id, user_id).await {
                tracing::debug!(operation_id = %id, "Replaying bulk operation for idempotency key");
                return Ok((
                    StatusCode::ACCEPTED,
                    Json(SubmitBulkResponse {
                        operation_id: existing.id,
                        status: existing.status,
                    }),
                ));
            }
        }
    }

    let session = state.sessions.for_user(user_id, ActionKind::Mutate).await?;
    let operation = state
        .executor
        .submit(user_id, req.actions, req.validate_only, session, idem.as_str())
        .await?;
    idempotency::bind(
        &state.idempotency,
        idem.key(),
        user_id,
        scope::BULK_ACTIONS_CREATE,
        &operation.id.to_string(),
    )
    .await;

    tracing::info!(
        operation_id = %operation.id,
        actions = operation.actions.len(),
        validate_only = operation.validate_only,
        "Bulk operation queued"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitBulkResponse {
            operation_id: operation.id,
            status: BulkStatus::Queued,
        }),
    ))
}

/// GET /api/v1/adscenter/bulk-actions/{id} - Operation status and summary
#[utoipa::path(
    get,
    path = "/api/v1/adscenter/bulk-actions/{id}",
    params(("id" = Uuid, Path, description = "Operation ID")),
    responses(
        (status = 200, description = "Operation", body = BulkOperation),
        (status = 404, description = "Operation not found", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn get_operation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<BulkOperation>, ApiError> {
    Ok(Json(state.executor.get_owned(id, user.user_id()).await?))
}

/// GET /api/v1/adscenter/bulk-actions/{id}/snapshots - Before/after snapshots
#[utoipa::path(
    get,
    path = "/api/v1/adscenter/bulk-actions/{id}/snapshots",
    params(("id" = Uuid, Path, description = "Operation ID")),
    responses(
        (status = 200, description = "Snapshots", body = SnapshotList),
        (status = 404, description = "Operation not found", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn list_snapshots(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SnapshotList>, ApiError> {
    let operation = state.executor.get_owned(id, user.user_id()).await?;
    let items = state.executor.snapshots(operation.id).await?;
    Ok(Json(SnapshotList { items }))
}

/// GET /api/v1/adscenter/bulk-actions/{id}/deadletters - Failed operations
#[utoipa::path(
    get,
    path = "/api/v1/adscenter/bulk-actions/{id}/deadletters",
    params(("id" = Uuid, Path, description = "Operation ID")),
    responses(
        (status = 200, description = "Dead letters", body = DeadLetterList),
        (status = 404, description = "Operation not found", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn list_dead_letters(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeadLetterList>, ApiError> {
    let operation = state.executor.get_owned(id, user.user_id()).await?;
    let items = state.executor.dead_letters(operation.id).await?;
    Ok(Json(DeadLetterList { items }))
}

/// POST /api/v1/adscenter/bulk-actions/{id}/deadletters/{dl_id}/retry - Replay one dead letter
#[utoipa::path(
    post,
    path = "/api/v1/adscenter/bulk-actions/{id}/deadletters/{dl_id}/retry",
    params(
        ("id" = Uuid, Path, description = "Operation ID"),
        ("dl_id" = Uuid, Path, description = "Dead letter ID")
    ),
    responses(
        (status = 200, description = "Dead letter after the retry", body = DeadLetter),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 500, description = "Live mutation disabled", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn retry_dead_letter(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, dl_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DeadLetter>, ApiError> {
    let operation = state.executor.get_owned(id, user.user_id()).await?;
    let session = state.sessions.for_user(user.user_id(), ActionKind::Mutate).await?;
    let dead_letter = state
        .executor
        .retry_dead_letter(&session, operation.id, dl_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to retry dead letter: {}", e);
            ApiError::from(e)
        })?;
    Ok(Json(dead_letter))
}

/// POST /api/v1/adscenter/bulk-actions/{id}/deadletters/retry-batch - Replay pending dead letters
#[utoipa::path(
    post,
    path = "/api/v1/adscenter/bulk-actions/{id}/deadletters/retry-batch",
    params(("id" = Uuid, Path, description = "Operation ID")),
    request_body = RetryBatchRequest,
    responses(
        (status = 200, description = "Retry counts", body = RetryBatchResult),
        (status = 404, description = "Operation not found", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn retry_batch(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<RetryBatchResult>, ApiError> {
    // The body is optional
    let req: RetryBatchRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RetryBatchRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::invalid_argument(format!("Invalid request body: {}", e)))?
    };
    let operation = state.executor.get_owned(id, user.user_id()).await?;
    let session = state.sessions.for_user(user.user_id(), ActionKind::Mutate).await?;
    let result = state
        .executor
        .retry_batch(&session, operation.id, req.action_type)
        .await?;
    tracing::info!(
        operation_id = %operation.id,
        attempted = result.attempted,
        resolved = result.resolved,
        "Dead letter batch retried"
    );
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::api::routes;
    use crate::api::test_support::harness;
    use crate::config::AdscenterConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post(uri: &str, user: &str, body: Value, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::post(uri)
            .header("content-type", "application/json")
            .header("x-user-id", user);
        if let Some(key) = key {
            builder = builder.header("x-idempotency-key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, user: &str) -> Request<Body> {
        Request::get(uri).header("x-user-id", user).body(Body::empty()).unwrap()
    }

    fn rotate_body() -> Value {
        json!({ "actions": [{
            "type": "ROTATE_LINK",
            "params": { "adResourceNames": ["customers/1/adGroupAds/1"], "finalUrlSuffix": "utm_source=x" }
        }]})
    }

    async fn wait_finished(app: &Router, id: &str) -> Value {
        for _ in 0..50 {
            let (_, body) = send(app, get(&format!("/api/v1/adscenter/bulk-actions/{}", id), "u1")).await;
            if body["status"] != "queued" && body["status"] != "running" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("operation {} did not finish", id);
    }

    #[tokio::test]
    async fn test_submit_runs_validate_only_in_background() {
        let h = harness(AdscenterConfig::default());
        let app = routes(h.state.clone());

        let (status, body) = send(&app, post("/api/v1/adscenter/bulk-actions", "u1", rotate_body(), None)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "queued");
        let id = body["operationId"].as_str().unwrap().to_string();

        let finished = wait_finished(&app, &id).await;
        assert_eq!(finished["status"], "completed");
        assert_eq!(finished["validateOnly"], true);
        assert_eq!(
            finished["summary"]["results"][0]["details"],
            json!({ "suffix": "utm_source=x", "targets": ["customers/1/adGroupAds/1"] })
        );

        let mutations = h.ads.mutations();
        assert_eq!(mutations.len(), 1);
        assert!(mutations[0].2);

        let (_, snapshots) = send(&app, get(&format!("/api/v1/adscenter/bulk-actions/{}/snapshots", id), "u1")).await;
        assert_eq!(snapshots["items"], json!([]));

        let types: Vec<String> = h.bus.published().into_iter().map(|(e, _)| e.event_type).collect();
        assert_eq!(
            types,
            vec!["BatchOpsTaskQueued", "BatchOpsTaskStarted", "BatchOpsTaskCompleted"]
        );
    }

    #[tokio::test]
    async fn test_idempotent_submit_returns_same_operation() {
        let h = harness(AdscenterConfig::default());
        let app = routes(h.state.clone());

        let uri = "/api/v1/adscenter/bulk-actions";
        let (_, first) = send(&app, post(uri, "u1", rotate_body(), Some("bulk-key-1"))).await;
        let (status, second) = send(&app, post(uri, "u1", rotate_body(), Some("bulk-key-1"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(first["operationId"], second["operationId"]);
    }

    #[tokio::test]
    async fn test_invalid_action_is_rejected_with_index() {
        let app = routes(harness(AdscenterConfig::default()).state);
        let body = json!({ "actions": [
            { "type": "ADJUST_CPC", "params": { "targetResourceNames": ["customers/1/adGroupCriteria/1~2"], "cpcMicros": 100 } },
            { "type": "ADJUST_BUDGET", "params": { "campaignBudgetResourceNames": ["customers/1/campaignBudgets/1"], "amountMicros": -5 } }
        ]});
        let (status, body) = send(&app, post("/api/v1/adscenter/bulk-actions", "u1", body, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["message"].as_str().unwrap().starts_with("actions[1]"));
    }

    #[tokio::test]
    async fn test_other_users_operation_is_not_found() {
        let app = routes(harness(AdscenterConfig::default()).state);
        let (_, body) = send(&app, post("/api/v1/adscenter/bulk-actions", "u1", rotate_body(), None)).await;
        let id = body["operationId"].as_str().unwrap();

        let (status, _) = send(&app, get(&format!("/api/v1/adscenter/bulk-actions/{}/deadletters", id), "u2")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_retry_batch_without_dead_letters() {
        let mut config = AdscenterConfig::default();
        config.live_mutate = true;
        let app = routes(harness(config).state);
        let (_, body) = send(&app, post("/api/v1/adscenter/bulk-actions", "u1", rotate_body(), None)).await;
        let id = body["operationId"].as_str().unwrap().to_string();
        wait_finished(&app, &id).await;

        let (status, body) = send(
            &app,
            post(
                &format!("/api/v1/adscenter/bulk-actions/{}/deadletters/retry-batch", id),
                "u1",
                json!({ "actionType": "ROTATE_LINK" }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "attempted": 0, "resolved": 0, "failed": 0 }));
    }
}
