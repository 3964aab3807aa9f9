// OpenAPI specification for the Offers API

use autoads_core::console::TokenBalance;
use autoads_core::offer::Offer;
use autoads_server::ErrorBody;
use utoipa::OpenApi;

use crate::api;
use crate::services::BillingReceipt;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::offers::create_offer,
        api::offers::get_offer,
        api::billing::balance,
        api::billing::reserve,
        api::billing::debit,
        api::billing::revert,
    ),
    components(schemas(
        ErrorBody,
        Offer,
        TokenBalance,
        BillingReceipt,
        api::offers::CreateOfferRequest,
        api::billing::TokenRequest,
    )),
    tags(
        (name = "offers", description = "Offer intake"),
        (name = "billing", description = "Token reserve, debit and revert")
    ),
    info(
        title = "AutoAds Offers API",
        description = "Offer creation and token billing, each announced on the event topic"
    )
)]
pub struct ApiDoc;
