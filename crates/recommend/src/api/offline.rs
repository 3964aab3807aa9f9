// Offline audit routes (admin or service token)

use autoads_server::{AdminUser, ApiError, ErrorBody, Json};
use axum::{extract::State, http::StatusCode, routing::post, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::AppState;
use crate::services::AuditJob;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OfflineAuditRequest {
    #[schema(example = "example.com")]
    pub seed_domain: String,
    /// Audited as given; when empty, recent warehouse keywords are used
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub landing_url: Option<String>,
    #[serde(default)]
    pub shard: Option<u32>,
    #[serde(default)]
    pub total_shards: Option<u32>,
}

impl From<OfflineAuditRequest> for AuditJob {
    fn from(req: OfflineAuditRequest) -> Self {
        AuditJob {
            seed_domain: req.seed_domain,
            keywords: req.keywords,
            account_id: req.account_id,
            landing_url: req.landing_url,
            shard: req.shard,
            total_shards: req.total_shards,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditAccepted {
    pub accepted: bool,
    pub seed_domain: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/internal/offline/brand-audit", post(brand_audit))
        .route("/internal/offline/brand-coverage-audit", post(coverage_audit))
}

/// POST /api/v1/recommend/internal/offline/brand-audit - Audit keywords in the background
#[utoipa::path(
    post,
    path = "/api/v1/recommend/internal/offline/brand-audit",
    request_body = OfflineAuditRequest,
    responses(
        (status = 202, description = "Audit started", body = AuditAccepted),
        (status = 400, description = "Invalid audit request", body = ErrorBody),
        (status = 403, description = "Admin access required", body = ErrorBody)
    ),
    tag = "recommend"
)]
pub async fn brand_audit(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(req): Json<OfflineAuditRequest>,
) -> Result<(StatusCode, Json<AuditAccepted>), ApiError> {
    let seed_domain = req.seed_domain.clone();
    state.engine.start_audit(req.into())?;
    tracing::info!(actor = admin.actor(), seed_domain = %seed_domain, "Brand audit accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(AuditAccepted {
            accepted: true,
            seed_domain,
        }),
    ))
}

/// POST /api/v1/recommend/internal/offline/brand-coverage-audit - Compute and store coverage in the background
#[utoipa::path(
    post,
    path = "/api/v1/recommend/internal/offline/brand-coverage-audit",
    request_body = OfflineAuditRequest,
    responses(
        (status = 202, description = "Coverage audit started", body = AuditAccepted),
        (status = 400, description = "Invalid audit request", body = ErrorBody),
        (status = 403, description = "Admin access required", body = ErrorBody)
    ),
    tag = "recommend"
)]
pub async fn coverage_audit(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(req): Json<OfflineAuditRequest>,
) -> Result<(StatusCode, Json<AuditAccepted>), ApiError> {
    let seed_domain = req.seed_domain.clone();
    state.engine.start_coverage_audit(req.into())?;
    tracing::info!(actor = admin.actor(), seed_domain = %seed_domain, "Brand coverage audit accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(AuditAccepted {
            accepted: true,
            seed_domain,
        }),
    ))
}
