// Token billing routes
//
// Each mutation is idempotent per (key, user, operation); the binding points
// at the event the first request produced.

use autoads_core::console::TokenBalance;
use autoads_core::idempotency::scope;
use autoads_server::{idempotency, ApiError, AuthUser, ErrorBody, Idempotency, Json};
use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;

use super::AppState;
use crate::services::BillingReceipt;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub amount: i64,
    #[serde(default)]
    pub reservation_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tokens", get(balance))
        .route("/tokens/reserve", post(reserve))
        .route("/tokens/debit", post(debit))
        .route("/tokens/revert", post(revert))
}

/// GET /api/v1/billing/tokens - Token balance of the caller
#[utoipa::path(
    get,
    path = "/api/v1/billing/tokens",
    responses(
        (status = 200, description = "Current balance", body = TokenBalance),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    tag = "billing"
)]
pub async fn balance(State(state): State<AppState>, user: AuthUser) -> Result<Json<TokenBalance>, ApiError> {
    Ok(Json(state.billing.balance(user.user_id()).await?))
}

/// Receipt of an earlier request under the same key, if any
async fn replayed(
    state: &AppState,
    idem: &Idempotency,
    user_id: &str,
    operation: &str,
) -> Result<Option<BillingReceipt>, ApiError> {
    let Some(event_id) = idempotency::lookup(&state.idempotency, idem.key(), user_id, operation).await? else {
        return Ok(None);
    };
    tracing::debug!(event_id = %event_id, scope = operation, "Replaying billing request for idempotency key");
    let reserved = operation == scope::BILLING_RESERVE;
    Ok(Some(state.billing.replay(user_id, &event_id, reserved).await?))
}

/// POST /api/v1/billing/tokens/reserve - Hold tokens for pending work
#[utoipa::path(
    post,
    path = "/api/v1/billing/tokens/reserve",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Tokens reserved; reservationId identifies the hold", body = BillingReceipt),
        (status = 400, description = "Amount not positive", body = ErrorBody),
        (status = 409, description = "Insufficient balance", body = ErrorBody)
    ),
    tag = "billing"
)]
pub async fn reserve(
    State(state): State<AppState>,
    user: AuthUser,
    idem: Idempotency,
    Json(req): Json<TokenRequest>,
) -> Result<Json<BillingReceipt>, ApiError> {
    let user_id = user.user_id();
    if let Some(receipt) = replayed(&state, &idem, user_id, scope::BILLING_RESERVE).await? {
        return Ok(Json(receipt));
    }
    let receipt = state
        .billing
        .reserve(user_id, req.amount, req.reason.as_deref(), idem.as_str())
        .await?;
    idempotency::bind(&state.idempotency, idem.key(), user_id, scope::BILLING_RESERVE, &receipt.event_id).await;
    Ok(Json(receipt))
}

/// POST /api/v1/billing/tokens/debit - Settle a reservation or charge directly
#[utoipa::path(
    post,
    path = "/api/v1/billing/tokens/debit",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Tokens debited", body = BillingReceipt),
        (status = 400, description = "Amount not positive", body = ErrorBody),
        (status = 409, description = "Insufficient balance", body = ErrorBody)
    ),
    tag = "billing"
)]
pub async fn debit(
    State(state): State<AppState>,
    user: AuthUser,
    idem: Idempotency,
    Json(req): Json<TokenRequest>,
) -> Result<Json<BillingReceipt>, ApiError> {
    let user_id = user.user_id();
    if let Some(receipt) = replayed(&state, &idem, user_id, scope::BILLING_DEBIT).await? {
        return Ok(Json(receipt));
    }
    let receipt = state
        .billing
        .debit(
            user_id,
            req.amount,
            req.reservation_id.as_deref(),
            req.reason.as_deref(),
            idem.as_str(),
        )
        .await?;
    idempotency::bind(&state.idempotency, idem.key(), user_id, scope::BILLING_DEBIT, &receipt.event_id).await;
    Ok(Json(receipt))
}

/// POST /api/v1/billing/tokens/revert - Return reserved tokens
#[utoipa::path(
    post,
    path = "/api/v1/billing/tokens/revert",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Tokens returned", body = BillingReceipt),
        (status = 400, description = "Missing reservation or bad amount", body = ErrorBody)
    ),
    tag = "billing"
)]
pub async fn revert(
    State(state): State<AppState>,
    user: AuthUser,
    idem: Idempotency,
    Json(req): Json<TokenRequest>,
) -> Result<Json<BillingReceipt>, ApiError> {
    let user_id = user.user_id();
    if let Some(receipt) = replayed(&state, &idem, user_id, scope::BILLING_REVERT).await? {
        return Ok(Json(receipt));
    }
    let receipt = state
        .billing
        .revert(
            user_id,
            req.amount,
            req.reservation_id.as_deref().unwrap_or_default(),
            req.reason.as_deref(),
            idem.as_str(),
        )
        .await?;
    idempotency::bind(&state.idempotency, idem.key(), user_id, scope::BILLING_REVERT, &receipt.event_id).await;
    Ok(Json(receipt))
}
