// Offer routes

use autoads_core::idempotency::scope;
use autoads_core::offer::Offer;
use autoads_server::{idempotency, ApiError, AuthUser, ErrorBody, Idempotency, Json};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;

use super::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOfferRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[schema(example = "https://example.com/landing")]
    pub url: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_offer))
        .route("/{id}", get(get_offer))
}

/// POST /api/v1/offers - Create an offer and announce it
#[utoipa::path(
    post,
    path = "/api/v1/offers",
    request_body = CreateOfferRequest,
    params(
        ("X-Idempotency-Key" = Option<String>, Header, description = "Replays return the first offer")
    ),
    responses(
        (status = 201, description = "Offer created", body = Offer),
        (status = 400, description = "Invalid URL", body = ErrorBody)
    ),
    tag = "offers"
)]
pub async fn create_offer(
    State(state): State<AppState>,
    user: AuthUser,
    idem: Idempotency,
    Json(req): Json<CreateOfferRequest>,
) -> Result<(StatusCode, Json<Offer>), ApiError> {
    let user_id = user.user_id();

    if let Some(target) = idempotency::lookup(&state.idempotency, idem.key(), user_id, scope::OFFERS_CREATE).await? {
        if let Ok(existing) = state.offers.get_owned(&target, user_id).await {
            tracing::debug!(offer_id = %existing.id, "Replaying offer for idempotency key");
            return Ok((StatusCode::CREATED, Json(existing)));
        }
    }

    let offer = state
        .offers
        .create(user_id, req.name.as_deref(), &req.url, idem.as_str())
        .await?;
    idempotency::bind(&state.idempotency, idem.key(), user_id, scope::OFFERS_CREATE, &offer.id).await;
    Ok((StatusCode::CREATED, Json(offer)))
}

/// GET /api/v1/offers/{id} - One offer of the caller
#[utoipa::path(
    get,
    path = "/api/v1/offers/{id}",
    params(("id" = String, Path, description = "Offer ID")),
    responses(
        (status = 200, description = "Offer", body = Offer),
        (status = 404, description = "Offer not found", body = ErrorBody)
    ),
    tag = "offers"
)]
pub async fn get_offer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Offer>, ApiError> {
    Ok(Json(state.offers.get_owned(&id, user.user_id()).await?))
}
