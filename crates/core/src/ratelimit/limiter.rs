//! Token bucket + concurrency semaphore

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use super::RateLimitError;

/// Tokens are never closer together than this; also used when RPM is zero
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Spacing between tokens for a given requests-per-minute rate, at least one second
pub fn interval_for(rpm: u32) -> Duration {
    if rpm == 0 {
        MIN_INTERVAL
    } else {
        (Duration::from_secs(60) / rpm).max(MIN_INTERVAL)
    }
}

/// Rate limiter combining evenly spaced tokens with a bounded number of
/// concurrently held slots.
///
/// Tokens are issued every `60s / rpm`, but never more than one per second,
/// with a burst of one: an idle limiter grants one token immediately, every
/// following token waits its turn. Over any 60-second window at most
/// `min(rpm, 60) + 1` acquires succeed.
///
/// `acquire` is cancel-safe by drop; a dropped acquire may consume its token.
#[derive(Debug)]
pub struct Limiter {
    rpm: u32,
    concurrency: usize,
    interval: Duration,
    next_token: Mutex<Instant>,
    slots: Arc<Semaphore>,
}

/// A held concurrency slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct LimiterPermit {
    _slot: OwnedSemaphorePermit,
}

impl LimiterPermit {
    /// Release the slot explicitly
    pub fn release(self) {}
}

impl Limiter {
    pub fn new(rpm: u32, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            rpm,
            concurrency,
            interval: interval_for(rpm),
            next_token: Mutex::new(Instant::now()),
            slots: Arc::new(Semaphore::new(concurrency)),
        }
    }

    pub fn rpm(&self) -> u32 {
        self.rpm
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Slots not currently held
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Wait for a token, then for a free slot.
    pub async fn acquire(&self) -> Result<LimiterPermit, RateLimitError> {
        let ready_at = self.reserve_token();
        tokio::time::sleep_until(ready_at).await;

        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RateLimitError::Closed)?;

        Ok(LimiterPermit { _slot: slot })
    }

    /// Acquire with a deadline
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<LimiterPermit, RateLimitError> {
        tokio::time::timeout(timeout, self.acquire())
            .await
            .map_err(|_| RateLimitError::Timeout)?
    }

    /// Book the next token and return the instant it becomes usable
    fn reserve_token(&self) -> Instant {
        let mut next = self.next_token.lock();
        let now = Instant::now();
        let slot = if *next > now { *next } else { now };
        *next = slot + self.interval;
        slot
    }
}
