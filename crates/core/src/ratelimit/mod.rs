// Rate-limit core
//
// Two composable primitives (Limiter, KeyedLimiters), a plan-driven policy
// document, daily quotas, and a retry policy for transient failures.
// Decision: Throttled callers acquire the per-key limiter first (fairness), then the global cap
// Decision: Timers use tokio::time so tests can run on paused time

mod keyed;
mod limiter;
mod policy;
mod quota;
mod retry;

pub use keyed::KeyedLimiters;
pub use limiter::{interval_for, Limiter, LimiterPermit};
pub use policy::{
    ActionKind, LimitsPolicy, PlanOverrides, PolicyDefaults, Quotas, RateOverride, RateSpec,
    FREE_PLAN,
};
pub use quota::DailyQuota;
pub use retry::{is_transient_message, RetryPolicy, Retryable};

use thiserror::Error;

/// Errors raised by the rate-limit primitives
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("limiter closed")]
    Closed,

    #[error("timed out waiting for rate limit")]
    Timeout,

    #[error("daily quota exceeded ({used}/{limit})")]
    QuotaExceeded { limit: u64, used: u64 },
}

/// Rate attached to a request: limiter key plus its effective spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRate {
    pub key: String,
    pub spec: RateSpec,
}
