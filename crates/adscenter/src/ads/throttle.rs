// Throttled Ads client
//
// Every attempt first takes a token and slot from the caller's keyed limiter,
// then from the process-wide cap. Transient failures are retried with
// exponential backoff; the limiters are re-acquired for each attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autoads_core::ratelimit::{KeyedLimiters, Limiter, RateSpec, RetryPolicy};
use serde_json::Value;

use super::{AdsApi, AdsResult, AdsSession};

/// Idle keyed limiters are dropped after this long
const KEY_TTL: Duration = Duration::from_secs(600);
const MAX_KEYS: usize = 10_000;

pub struct ThrottledAds {
    inner: Arc<dyn AdsApi>,
    keyed: KeyedLimiters,
    global: Limiter,
    retry: RetryPolicy,
}

impl ThrottledAds {
    pub fn new(inner: Arc<dyn AdsApi>, global: RateSpec, retry: RetryPolicy) -> Self {
        Self {
            inner,
            keyed: KeyedLimiters::new(KEY_TTL, MAX_KEYS),
            global: Limiter::new(global.rpm, global.concurrency),
            retry,
        }
    }

    async fn call<T, F, Fut>(&self, session: &AdsSession, op: F) -> AdsResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AdsResult<T>>,
    {
        let op = &op;
        let keyed = &self.keyed;
        let global = &self.global;
        self.retry
            .run(move |_attempt| async move {
                let _key_permit = match &session.rate {
                    Some(rate) => Some(keyed.get(&rate.key, rate.spec).acquire().await?),
                    None => None,
                };
                let _global_permit = global.acquire().await?;
                op().await
            })
            .await
    }
}

#[async_trait]
impl AdsApi for ThrottledAds {
    fn is_live(&self) -> bool {
        self.inner.is_live()
    }

    async fn list_accessible_customers(&self, session: &AdsSession) -> AdsResult<Vec<String>> {
        self.call(session, || self.inner.list_accessible_customers(session))
            .await
    }

    async fn search_stream(
        &self,
        session: &AdsSession,
        customer_id: &str,
        query: &str,
    ) -> AdsResult<Vec<Value>> {
        self.call(session, || self.inner.search_stream(session, customer_id, query))
            .await
    }

    async fn mutate(
        &self,
        session: &AdsSession,
        customer_id: &str,
        operations: &[Value],
        validate_only: bool,
    ) -> AdsResult<Value> {
        self.call(session, || {
            self.inner
                .mutate(session, customer_id, operations, validate_only)
        })
        .await
    }

    async fn mutate_manager_links(
        &self,
        session: &AdsSession,
        customer_id: &str,
        operations: &[Value],
    ) -> AdsResult<Value> {
        self.call(session, || {
            self.inner
                .mutate_manager_links(session, customer_id, operations)
        })
        .await
    }
}
