// Business logic behind the Adscenter HTTP routes
//
// Services own the Ads client, the stores and the policy objects; handlers
// only extract, call and render.

pub mod browser;
pub mod executor;
pub mod limits;
pub mod mcc;
pub mod oauth;
pub mod preflight;
pub mod session;

pub use browser::BrowserResolver;
pub use executor::{ActionOutcome, Executor, RetryBatchResult};
pub use limits::{LimitsService, LimitsView};
pub use mcc::{MccResult, MccService};
pub use oauth::{ConnectedAccount, OAuthService};
pub use preflight::{PreflightReport, PreflightService};
pub use session::SessionResolver;
