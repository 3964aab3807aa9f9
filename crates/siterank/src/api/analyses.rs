// Analysis routes: create (idempotent) and latest-by-offer

use autoads_core::idempotency::scope;
use autoads_core::siterank::Analysis;
use autoads_server::{idempotency, ApiError, AuthUser, ErrorBody, Idempotency, Json};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub offer_id: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/{offer_id}", get(latest))
}

/// POST /api/v1/siterank/analyze - Start an analysis for an offer
#[utoipa::path(
    post,
    path = "/api/v1/siterank/analyze",
    request_body = AnalyzeRequest,
    params(
        ("X-Idempotency-Key" = Option<String>, Header, description = "Replays return the first analysis")
    ),
    responses(
        (status = 202, description = "Analysis accepted", body = Analysis),
        (status = 400, description = "Missing offer id", body = ErrorBody),
        (status = 409, description = "Offer already has an active analysis", body = ErrorBody)
    ),
    tag = "siterank"
)]
pub async fn analyze(
    State(state): State<AppState>,
    user: AuthUser,
    idem: Idempotency,
    Json(req): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<Analysis>), ApiError> {
    let user_id = user.user_id();

    if let Some(target) =
        idempotency::lookup(&state.idempotency, idem.key(), user_id, scope::SITERANK_ANALYZE).await?
    {
        if let Ok(id) = target.parse::<Uuid>() {
            if let Ok(existing) = state.analyzer.get_owned(id, user_id).await {
                tracing::debug!(analysis_id = %id, "Replaying analysis for idempotency key");
                return Ok((StatusCode::ACCEPTED, Json(existing)));
            }
        }
    }

    let analysis = match state.analyzer.create(user_id, &req.offer_id, idem.as_str()).await {
        Ok(analysis) => analysis,
        Err(e) if e.is_already_exists() && idem.key().is_some() => {
            match state.analyzer.latest(req.offer_id.trim(), user_id).await {
                Ok(latest) => {
                    tracing::info!(analysis_id = %latest.id, "Binding idempotency key to active analysis");
                    latest
                }
                Err(_) => return Err(e.into()),
            }
        }
        Err(e) => return Err(e.into()),
    };

    idempotency::bind(
        &state.idempotency,
        idem.key(),
        user_id,
        scope::SITERANK_ANALYZE,
        &analysis.id.to_string(),
    )
    .await;

    tracing::info!(analysis_id = %analysis.id, offer_id = %analysis.offer_id, "Siterank analysis accepted");
    Ok((StatusCode::ACCEPTED, Json(analysis)))
}

/// GET /api/v1/siterank/{offer_id} - Newest analysis of the caller for an offer
#[utoipa::path(
    get,
    path = "/api/v1/siterank/{offer_id}",
    params(("offer_id" = String, Path, description = "Offer ID")),
    responses(
        (status = 200, description = "Latest analysis", body = Analysis),
        (status = 404, description = "No analysis for this offer", body = ErrorBody)
    ),
    tag = "siterank"
)]
pub async fn latest(
    State(state): State<AppState>,
    user: AuthUser,
    Path(offer_id): Path<String>,
) -> Result<Json<Analysis>, ApiError> {
    let analysis = state.analyzer.latest(&offer_id, user.user_id()).await?;
    Ok(Json(analysis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use autoads_core::memory::{InMemoryBus, InMemoryStore};
    use autoads_core::ratelimit::RetryPolicy;
    use autoads_core::EventRecorder;
    use autoads_server::AuthConfig;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::services::{Analyzer, DomainCache};

    fn app() -> Router {
        let store = Arc::new(InMemoryStore::new());
        let analyzer = Arc::new(Analyzer::new(
            store.clone(),
            store.clone(),
            DomainCache::new(store.clone()),
            None,
            EventRecorder::new(store.clone(), Arc::new(InMemoryBus::new())),
            RetryPolicy::no_retry(),
        ));
        super::super::routes(AppState {
            auth: Arc::new(AuthConfig::default()),
            analyzer,
            idempotency: store,
        })
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_requires_identity() {
        let request = Request::post("/api/v1/siterank/analyze")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"offerId":"o1"}"#))
            .unwrap();
        let (status, body) = call(&app(), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_blank_offer_is_invalid() {
        let request = Request::post("/api/v1/siterank/analyze")
            .header("x-user-id", "u1")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"offerId":" "}"#))
            .unwrap();
        let (status, body) = call(&app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_latest_unknown_offer_is_404() {
        let request = Request::get("/api/v1/siterank/o404")
            .header("x-user-id", "u1")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(&app(), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
