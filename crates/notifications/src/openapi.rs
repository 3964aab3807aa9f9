// OpenAPI specification for the Notifications API

use autoads_core::notification::{Notification, NotificationMessage, Severity};
use autoads_server::ErrorBody;
use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(api::recent::recent, api::push::push),
    components(schemas(ErrorBody, api::recent::RecentPage, Notification, NotificationMessage, Severity)),
    tags(
        (name = "notifications", description = "User notifications from completion events")
    ),
    info(
        title = "AutoAds Notifications API",
        description = "Cursor-paginated user notifications"
    )
)]
pub struct ApiDoc;
