// Recent notifications of the caller

use autoads_core::notification::{page_size, parse_cursor, Notification};
use autoads_core::NotificationStore;
use autoads_server::{ApiError, AuthUser, ErrorBody};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct RecentQuery {
    /// Page size, 20 when absent or 0, at most 100
    pub limit: Option<i64>,
    /// Last seen id; "0" starts from the newest
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecentPage {
    pub items: Vec<Notification>,
    /// Pass as `cursor` for the next page; absent on the last page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/recent", get(recent))
}

/// GET /api/v1/notifications/recent - Newest notifications first
#[utoipa::path(
    get,
    path = "/api/v1/notifications/recent",
    params(RecentQuery),
    responses(
        (status = 200, description = "One page of notifications", body = RecentPage),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    tag = "notifications"
)]
pub async fn recent(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<RecentQuery>,
) -> Result<Json<RecentPage>, ApiError> {
    let limit = page_size(query.limit);
    let cursor = parse_cursor(query.cursor.as_deref());
    let items = state.notifications.recent(user.user_id(), limit, cursor).await?;
    let next_cursor = if items.len() as i64 == limit {
        items.last().map(|n| n.id.to_string())
    } else {
        None
    };
    Ok(Json(RecentPage { items, next_cursor }))
}
