// MCC link routes

use autoads_core::ratelimit::ActionKind;
use autoads_server::{ApiError, AuthUser, ErrorBody, Json};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::AppState;
use crate::services::MccResult;

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(rename_all = "camelCase")]
pub struct CustomerRequest {
    #[schema(example = "1234567890")]
    pub customer_id: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/mcc/link", post(link))
        .route("/mcc/unlink", post(unlink))
        .route("/mcc/status", get(status))
}

/// POST /api/v1/adscenter/mcc/link - Invite the platform MCC to manage a customer
#[utoipa::path(
    post,
    path = "/api/v1/adscenter/mcc/link",
    request_body = CustomerRequest,
    responses(
        (status = 200, description = "Link requested", body = MccResult),
        (status = 400, description = "Invalid customer id", body = ErrorBody),
        (status = 502, description = "Google Ads error", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn link(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CustomerRequest>,
) -> Result<Json<MccResult>, ApiError> {
    let session = state.sessions.for_user(user.user_id(), ActionKind::Mcc).await?;
    let result = state.mcc.link(&session, &req.customer_id).await.map_err(|e| {
        tracing::error!("Failed to link MCC: {}", e);
        ApiError::from(e)
    })?;
    Ok(Json(result))
}

/// POST /api/v1/adscenter/mcc/unlink - Deactivate the platform MCC link
#[utoipa::path(
    post,
    path = "/api/v1/adscenter/mcc/unlink",
    request_body = CustomerRequest,
    responses(
        (status = 200, description = "Link deactivated", body = MccResult),
        (status = 404, description = "No link to the platform MCC", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn unlink(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CustomerRequest>,
) -> Result<Json<MccResult>, ApiError> {
    let session = state.sessions.for_user(user.user_id(), ActionKind::Mcc).await?;
    Ok(Json(state.mcc.unlink(&session, &req.customer_id).await?))
}

/// GET /api/v1/adscenter/mcc/status - Link status for a customer
#[utoipa::path(
    get,
    path = "/api/v1/adscenter/mcc/status",
    params(CustomerRequest),
    responses(
        (status = 200, description = "Link status", body = MccResult),
        (status = 400, description = "Invalid customer id", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn status(
    State(state): State<AppState>,
    user: AuthUser,
    Query(req): Query<CustomerRequest>,
) -> Result<Json<MccResult>, ApiError> {
    let session = state.sessions.for_user(user.user_id(), ActionKind::Mcc).await?;
    Ok(Json(state.mcc.status(&session, &req.customer_id).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::routes;
    use crate::api::test_support::harness;
    use crate::config::AdscenterConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn config() -> AdscenterConfig {
        let mut config = AdscenterConfig::default();
        config.credentials.login_customer_id = Some("1112223333".into());
        config
    }

    #[tokio::test]
    async fn test_stub_link_is_queued() {
        let app = routes(harness(config()).state);
        let response = app
            .oneshot(
                Request::post("/api/v1/adscenter/mcc/link")
                    .header("content-type", "application/json")
                    .header("x-user-id", "u1")
                    .body(Body::from(json!({ "customerId": "123-456-7890" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "queued");
        assert_eq!(body["customerId"], "1234567890");
        assert_eq!(body["managerCustomerId"], "1112223333");
    }

    #[tokio::test]
    async fn test_status_rejects_short_customer_id() {
        let app = routes(harness(config()).state);
        let response = app
            .oneshot(
                Request::get("/api/v1/adscenter/mcc/status?customerId=12345")
                    .header("x-user-id", "u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
