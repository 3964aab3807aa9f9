// OpenAPI specification for the Adscenter API
//
// Served by the adscenter binary under /swagger-ui.

use autoads_core::ads::{ActionType, BulkAction, BulkOperation, BulkStatus, DeadLetter, DeadLetterStatus, Snapshot, SnapshotPhase};
use autoads_server::ErrorBody;
use utoipa::OpenApi;

use crate::api;
use crate::services::{preflight, ConnectedAccount, LimitsView, MccResult, PreflightReport, RetryBatchResult};

#[derive(OpenApi)]
#[openapi(
    paths(
        api::accounts::preflight,
        api::accounts::list_accounts,
        api::accounts::my_limits,
        api::oauth::auth_url,
        api::oauth::callback,
        api::mcc::link,
        api::mcc::unlink,
        api::mcc::status,
        api::bulk_actions::submit,
        api::bulk_actions::get_operation,
        api::bulk_actions::list_snapshots,
        api::bulk_actions::list_dead_letters,
        api::bulk_actions::retry_dead_letter,
        api::bulk_actions::retry_batch,
    ),
    components(
        schemas(
            ErrorBody,
            // Preflight and accounts
            api::accounts::PreflightRequest, api::accounts::AccountItem, api::accounts::AccountList,
            PreflightReport, preflight::Check, preflight::LegacyCheck, preflight::Severity, preflight::Summary,
            LimitsView,
            // OAuth and MCC
            api::oauth::AuthUrlResponse, ConnectedAccount,
            api::mcc::CustomerRequest, MccResult,
            // Bulk actions
            api::bulk_actions::SubmitBulkRequest, api::bulk_actions::SubmitBulkResponse,
            api::bulk_actions::SnapshotList, api::bulk_actions::DeadLetterList,
            api::bulk_actions::RetryBatchRequest, RetryBatchResult,
            BulkAction, BulkOperation, BulkStatus, ActionType,
            Snapshot, SnapshotPhase, DeadLetter, DeadLetterStatus,
        )
    ),
    tags(
        (name = "adscenter", description = "Google Ads connection, preflight and bulk mutations")
    ),
    info(
        title = "AutoAds Adscenter API",
        description = "OAuth, MCC linking, preflight checks and bulk actions against Google Ads"
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_lists_bulk_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/adscenter/bulk-actions"));
        assert!(doc
            .paths
            .paths
            .contains_key("/api/v1/adscenter/bulk-actions/{id}/deadletters/{dl_id}/retry"));
    }
}
