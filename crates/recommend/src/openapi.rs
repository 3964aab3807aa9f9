// OpenAPI specification for the Recommend API

use autoads_core::brand::{Coverage, CoverageResult, KeywordRisk, MatchMethod, RiskSeverity};
use autoads_server::ErrorBody;
use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::brand::brand_check,
        api::brand::get_coverage,
        api::brand::planned_coverage,
        api::offline::brand_audit,
        api::offline::coverage_audit,
    ),
    components(schemas(
        ErrorBody,
        api::brand::BrandCheckRequest,
        api::brand::BrandCheckResponse,
        api::brand::PlannedCoverageRequest,
        api::brand::PlannedCoverageResponse,
        api::offline::OfflineAuditRequest,
        api::offline::AuditAccepted,
        KeywordRisk,
        MatchMethod,
        RiskSeverity,
        Coverage,
        CoverageResult,
    )),
    tags(
        (name = "recommend", description = "Brand-risk checks, audits and coverage")
    ),
    info(
        title = "AutoAds Recommend API",
        description = "Brand alias derivation and keyword risk matching"
    )
)]
pub struct ApiDoc;
