// OpenAPI specification for the Siterank API

use autoads_core::siterank::{Analysis, AnalysisStatus};
use autoads_server::ErrorBody;
use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(api::analyses::analyze, api::analyses::latest),
    components(schemas(ErrorBody, api::analyses::AnalyzeRequest, Analysis, AnalysisStatus)),
    tags(
        (name = "siterank", description = "Offer evaluation via domain traffic intelligence")
    ),
    info(
        title = "AutoAds Siterank API",
        description = "Idempotent, cached domain traffic analysis of offers"
    )
)]
pub struct ApiDoc;
