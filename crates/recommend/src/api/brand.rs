// Brand-check and coverage routes

use autoads_core::brand::{Coverage, CoverageResult, KeywordRisk};
use autoads_server::{ApiError, AuthUser, ErrorBody, Json};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrandCheckRequest {
    #[schema(example = "example.com")]
    pub seed_domain: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Accepted for compatibility; matching is locale independent
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub landing_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrandCheckResponse {
    pub seed_domain: String,
    pub aliases: Vec<String>,
    pub items: Vec<KeywordRisk>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(rename_all = "camelCase")]
pub struct CoverageQuery {
    pub seed_domain: String,
    pub account_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlannedCoverageRequest {
    pub seed_domain: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub landing_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlannedCoverageResponse {
    pub seed_domain: String,
    pub aliases: Vec<String>,
    #[serde(flatten)]
    pub coverage: Coverage,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/keywords/brand-check", post(brand_check))
        .route("/brand-coverage", get(get_coverage))
        .route("/brand-coverage/planned", post(planned_coverage))
}

/// POST /api/v1/recommend/keywords/brand-check - Classify keywords against a seed's brand
#[utoipa::path(
    post,
    path = "/api/v1/recommend/keywords/brand-check",
    request_body = BrandCheckRequest,
    responses(
        (status = 200, description = "One verdict per keyword, in request order", body = BrandCheckResponse),
        (status = 400, description = "Missing seed domain or keywords", body = ErrorBody)
    ),
    tag = "recommend"
)]
pub async fn brand_check(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(req): Json<BrandCheckRequest>,
) -> Result<Json<BrandCheckResponse>, ApiError> {
    let check = state
        .engine
        .check(&req.seed_domain, &req.keywords, req.landing_url.as_deref())
        .await?;
    tracing::debug!(
        seed_domain = %check.seed_domain,
        keywords = check.items.len(),
        locale = req.locale.as_deref().unwrap_or(""),
        "Brand check"
    );
    Ok(Json(BrandCheckResponse {
        seed_domain: check.seed_domain,
        aliases: check.aliases,
        items: check.items,
    }))
}

/// GET /api/v1/recommend/brand-coverage - Stored coverage for a seed and account
#[utoipa::path(
    get,
    path = "/api/v1/recommend/brand-coverage",
    params(CoverageQuery),
    responses(
        (status = 200, description = "Latest coverage audit", body = CoverageResult),
        (status = 404, description = "No coverage audit yet", body = ErrorBody)
    ),
    tag = "recommend"
)]
pub async fn get_coverage(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<CoverageQuery>,
) -> Result<Json<CoverageResult>, ApiError> {
    let coverage = state
        .engine
        .get_coverage(&query.seed_domain, query.account_id.as_deref())
        .await?;
    Ok(Json(coverage))
}

/// POST /api/v1/recommend/brand-coverage/planned - Coverage of a keyword plan, not stored
#[utoipa::path(
    post,
    path = "/api/v1/recommend/brand-coverage/planned",
    request_body = PlannedCoverageRequest,
    responses(
        (status = 200, description = "Computed coverage", body = PlannedCoverageResponse),
        (status = 400, description = "Missing seed domain", body = ErrorBody)
    ),
    tag = "recommend"
)]
pub async fn planned_coverage(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(req): Json<PlannedCoverageRequest>,
) -> Result<Json<PlannedCoverageResponse>, ApiError> {
    let planned = state
        .engine
        .planned_coverage(&req.seed_domain, &req.keywords, req.landing_url.as_deref())
        .await?;
    Ok(Json(PlannedCoverageResponse {
        seed_domain: planned.seed_domain,
        aliases: planned.aliases,
        coverage: planned.coverage,
    }))
}
