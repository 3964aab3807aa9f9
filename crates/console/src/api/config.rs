// Key-value console configuration

use autoads_core::console::ConfigEntry;
use autoads_core::ConsoleStore;
use autoads_server::{AdminUser, ApiError, ErrorBody, Json};
use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use serde_json::Value;

use super::AppState;

const MAX_KEY_LEN: usize = 128;

fn valid_key(key: &str) -> Result<&str, ApiError> {
    let ok = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !ok {
        return Err(ApiError::invalid_argument(
            "config key must be 1-128 characters of letters, digits, '.', '_' or '-'",
        ));
    }
    Ok(key)
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/config/{key}", get(get_config).put(put_config))
}

/// GET /api/v1/console/config/{key} - Stored value
#[utoipa::path(
    get,
    path = "/api/v1/console/config/{key}",
    params(("key" = String, Path, description = "Config key")),
    responses(
        (status = 200, description = "Entry", body = ConfigEntry),
        (status = 404, description = "Key not set", body = ErrorBody)
    ),
    tag = "config"
)]
pub async fn get_config(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(key): Path<String>,
) -> Result<Json<ConfigEntry>, ApiError> {
    let key = valid_key(&key)?;
    state
        .console
        .get_config(key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Config {} not found", key)))
}

/// PUT /api/v1/console/config/{key} - Replace the value with any JSON
#[utoipa::path(
    put,
    path = "/api/v1/console/config/{key}",
    params(("key" = String, Path, description = "Config key")),
    request_body(content = String, content_type = "application/json", description = "Any JSON value"),
    responses(
        (status = 200, description = "Stored entry", body = ConfigEntry),
        (status = 400, description = "Invalid key", body = ErrorBody)
    ),
    tag = "config"
)]
pub async fn put_config(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<ConfigEntry>, ApiError> {
    let key = valid_key(&key)?;
    tracing::info!(actor = admin.actor(), key, "Console config updated");
    Ok(Json(state.console.put_config(key, &value).await?))
}
