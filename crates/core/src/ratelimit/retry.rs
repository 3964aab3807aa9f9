//! Retry policy implementation

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors that know whether a retry could help
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Exponential backoff for transient failures.
///
/// # Example
///
/// ```
/// use autoads_core::ratelimit::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential()
///     .with_max_attempts(3)
///     .with_base(Duration::from_millis(200))
///     .with_max(Duration::from_secs(2));
///
/// assert_eq!(policy.delay_for_retry(1), Duration::from_millis(200));
/// assert_eq!(policy.delay_for_retry(2), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including initial), at least 1
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(with = "duration_millis")]
    pub base: Duration,

    /// Upper bound for any single delay
    #[serde(with = "duration_millis")]
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// 3 attempts, 200ms base, 2s cap
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_millis(200),
            max: Duration::from_secs(2),
        }
    }

    /// Create a policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Create from environment variables.
    /// - ADS_RETRY_ATTEMPTS (default 3)
    /// - ADS_RETRY_BASE_MS (default 200)
    /// - ADS_RETRY_MAX_MS (default 2000)
    pub fn from_env() -> Self {
        let read = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        Self {
            max_attempts: read("ADS_RETRY_ATTEMPTS", 3).max(1) as u32,
            base: Duration::from_millis(read("ADS_RETRY_BASE_MS", 200)),
            max: Duration::from_millis(read("ADS_RETRY_MAX_MS", 2000)),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// attempts run out. The attempt number (1-based) is passed to `op`.
    ///
    /// Cancellation: dropping the returned future stops between attempts.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && e.is_retryable() => {
                    let delay = self.delay_for_retry(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Text-based detection of transient failures: timeouts and deadline
/// exceeded, HTTP 429, and any HTTP 5xx status appearing in the message.
/// Only for errors without a typed status (transport, untyped text).
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    const MARKERS: [&str; 9] = [
        "timeout",
        "timed out",
        "deadline exceeded",
        "deadline_exceeded",
        "too many requests",
        "resource_exhausted",
        "rate limit exceeded",
        "service unavailable",
        "bad gateway",
    ];
    if MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| {
            token.len() == 3
                && token.chars().all(|c| c.is_ascii_digit())
                && (token == "429" || token.starts_with('5'))
        })
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
