// Services layer

pub mod billing;
pub mod offers;

pub use billing::{Billing, BillingReceipt};
pub use offers::OfferService;

pub const EVENT_SOURCE: &str = "offers";
