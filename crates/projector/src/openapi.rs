// OpenAPI specification for the Projector API

use autoads_server::ErrorBody;
use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(api::push::push),
    components(schemas(ErrorBody)),
    tags(
        (name = "projector", description = "Idempotent event projection")
    ),
    info(
        title = "AutoAds Projector API",
        description = "Push endpoint writing the event projection read model"
    )
)]
pub struct ApiDoc;
