//! Per-user daily request quota (UTC days)

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;

use super::RateLimitError;

#[derive(Default)]
struct Usage {
    day: Option<NaiveDate>,
    counts: HashMap<String, u64>,
}

/// In-process usage counters. Derived state only; counters reset at UTC midnight.
#[derive(Default)]
pub struct DailyQuota {
    usage: Mutex<Usage>,
}

impl DailyQuota {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request for `user_id` against `limit` (no limit ⇒ always allowed).
    /// Returns the usage after this request.
    pub fn try_consume(&self, user_id: &str, limit: Option<u64>) -> Result<u64, RateLimitError> {
        self.try_consume_on(Utc::now().date_naive(), user_id, limit)
    }

    fn try_consume_on(
        &self,
        today: NaiveDate,
        user_id: &str,
        limit: Option<u64>,
    ) -> Result<u64, RateLimitError> {
        let mut usage = self.usage.lock();
        if usage.day != Some(today) {
            usage.day = Some(today);
            usage.counts.clear();
        }
        let used = usage.counts.entry(user_id.to_string()).or_insert(0);
        if let Some(limit) = limit {
            if *used >= limit {
                return Err(RateLimitError::QuotaExceeded {
                    limit,
                    used: *used,
                });
            }
        }
        *used += 1;
        Ok(*used)
    }

    /// Requests counted today for `user_id`
    pub fn usage(&self, user_id: &str) -> u64 {
        let usage = self.usage.lock();
        if usage.day != Some(Utc::now().date_naive()) {
            return 0;
        }
        usage.counts.get(user_id).copied().unwrap_or(0)
    }
}
