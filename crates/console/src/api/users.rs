// User administration routes

use autoads_core::console::{Subscription, TokenBalance, UserRecord};
use autoads_server::{AdminUser, ApiError, ErrorBody, Json};
use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct UserListQuery {
    /// Page size, 50 by default, at most 200
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserList {
    pub items: Vec<UserRecord>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantRequest {
    #[schema(example = 100)]
    pub amount: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubscriptionRequest {
    #[schema(example = "PRO")]
    pub plan: String,
    /// `active` extends the current period by 30 days
    #[schema(example = "active")]
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleRequest {
    /// ADMIN or USER
    #[schema(example = "ADMIN")]
    pub role: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", get(get_user))
        .route("/users/{id}/tokens", get(get_tokens).post(grant_tokens))
        .route("/users/{id}/subscription", get(get_subscription).put(put_subscription))
        .route("/users/{id}/role", put(put_role))
}

/// GET /api/v1/console/users - Users, newest first
#[utoipa::path(
    get,
    path = "/api/v1/console/users",
    params(UserListQuery),
    responses(
        (status = 200, description = "One page of users", body = UserList),
        (status = 403, description = "Not an admin", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<UserListQuery>,
) -> Result<Json<UserList>, ApiError> {
    let items = state.accounts.list_users(query.limit, query.offset).await?;
    Ok(Json(UserList { items }))
}

/// GET /api/v1/console/users/{id} - One user
#[utoipa::path(
    get,
    path = "/api/v1/console/users/{id}",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserRecord),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<UserRecord>, ApiError> {
    Ok(Json(state.accounts.get_user(&id).await?))
}

/// GET /api/v1/console/users/{id}/tokens - Token balance
#[utoipa::path(
    get,
    path = "/api/v1/console/users/{id}/tokens",
    params(("id" = String, Path, description = "User ID")),
    responses((status = 200, description = "Balance, 0 for users without a ledger row", body = TokenBalance)),
    tag = "users"
)]
pub async fn get_tokens(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<TokenBalance>, ApiError> {
    Ok(Json(state.accounts.balance(&id).await?))
}

/// POST /api/v1/console/users/{id}/tokens - Grant tokens
#[utoipa::path(
    post,
    path = "/api/v1/console/users/{id}/tokens",
    params(("id" = String, Path, description = "User ID")),
    request_body = GrantRequest,
    responses(
        (status = 200, description = "Balance after the grant", body = TokenBalance),
        (status = 400, description = "Amount is not positive", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn grant_tokens(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    Json(req): Json<GrantRequest>,
) -> Result<Json<TokenBalance>, ApiError> {
    let balance = state
        .accounts
        .grant_tokens(&id, req.amount, req.reason.as_deref(), admin.actor())
        .await?;
    Ok(Json(balance))
}

/// GET /api/v1/console/users/{id}/subscription - Current subscription
#[utoipa::path(
    get,
    path = "/api/v1/console/users/{id}/subscription",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Subscription", body = Subscription),
        (status = 404, description = "No subscription", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn get_subscription(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Subscription>, ApiError> {
    Ok(Json(state.accounts.subscription(&id).await?))
}

/// PUT /api/v1/console/users/{id}/subscription - Upsert plan and status
#[utoipa::path(
    put,
    path = "/api/v1/console/users/{id}/subscription",
    params(("id" = String, Path, description = "User ID")),
    request_body = SubscriptionRequest,
    responses(
        (status = 200, description = "Subscription after the upsert", body = Subscription),
        (status = 400, description = "Missing plan or status", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn put_subscription(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    Json(req): Json<SubscriptionRequest>,
) -> Result<Json<Subscription>, ApiError> {
    let subscription = state
        .accounts
        .set_subscription(&id, &req.plan, &req.status, admin.actor())
        .await?;
    Ok(Json(subscription))
}

/// PUT /api/v1/console/users/{id}/role - Set ADMIN or USER
#[utoipa::path(
    put,
    path = "/api/v1/console/users/{id}/role",
    params(("id" = String, Path, description = "User ID")),
    request_body = RoleRequest,
    responses(
        (status = 200, description = "Updated user", body = UserRecord),
        (status = 400, description = "Role is neither ADMIN nor USER", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn put_role(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    Json(req): Json<RoleRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    tracing::info!(actor = admin.actor(), user_id = %id, role = %req.role, "Role change requested");
    Ok(Json(state.accounts.set_role(&id, &req.role).await?))
}
