// Google Ads connection routes

use autoads_server::{ApiError, AuthUser, ErrorBody};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{request_host, AppState};
use crate::services::ConnectedAccount;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlResponse {
    pub auth_url: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
    /// Manager account to act through, 10 digits
    #[serde(default)]
    pub login_customer_id: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/oauth/url", get(auth_url))
        .route("/oauth/callback", get(callback))
}

/// GET /api/v1/adscenter/oauth/url - Consent URL bound to the caller
#[utoipa::path(
    get,
    path = "/api/v1/adscenter/oauth/url",
    responses(
        (status = 200, description = "Consent URL", body = AuthUrlResponse),
        (status = 401, description = "Unauthenticated", body = ErrorBody),
        (status = 500, description = "OAuth not configured", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn auth_url(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
) -> Result<Json<AuthUrlResponse>, ApiError> {
    let auth_url = state
        .oauth
        .authorization_url(user.user_id(), request_host(&headers))?;
    Ok(Json(AuthUrlResponse { auth_url }))
}

/// GET /api/v1/adscenter/oauth/callback - Exchange the code and store the connection
///
/// The caller is identified by the signed state, not by request headers.
#[utoipa::path(
    get,
    path = "/api/v1/adscenter/oauth/callback",
    params(CallbackParams),
    responses(
        (status = 200, description = "Account connected", body = ConnectedAccount),
        (status = 400, description = "Invalid state, code or missing refresh token", body = ErrorBody),
        (status = 502, description = "Token exchange failed", body = ErrorBody)
    ),
    tag = "adscenter"
)]
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Json<ConnectedAccount>, ApiError> {
    let account = state
        .oauth
        .complete(
            &params.code,
            &params.state,
            params.login_customer_id.as_deref(),
            request_host(&headers),
        )
        .await
        .map_err(|e| {
            tracing::warn!("OAuth callback failed: {}", e);
            ApiError::from(e)
        })?;
    Ok(Json(account))
}
