// Siterank analysis pipeline
//
// create() inserts a pending analysis, records SiterankRequested and starts
// the background task. perform() drives it to completed or failed:
//   running → offer URL → host → domain cache → upstream → cache write → event

use std::sync::Arc;

use autoads_core::events::{SiterankCompletedData, SiterankRequestedData};
use autoads_core::ratelimit::RetryPolicy;
use autoads_core::siterank::{host_of, Analysis, AnalysisStatus, DomainCacheEntry};
use autoads_core::task::catch_panic;
use autoads_core::offer::Offer;
use autoads_core::{AnalysisStore, Envelope, EventRecorder, OfferStore, StoreError};
use serde_json::{json, Map, Value};
use tracing::instrument;
use uuid::Uuid;

use super::DomainCache;
use crate::error::{ServiceError, ServiceResult};
use crate::traffic::TrafficSource;

pub const EVENT_SOURCE: &str = "siterank";

pub struct Analyzer {
    analyses: Arc<dyn AnalysisStore>,
    offers: Arc<dyn OfferStore>,
    cache: DomainCache,
    source: Option<Arc<dyn TrafficSource>>,
    recorder: EventRecorder,
    retry: RetryPolicy,
}

/// Outcome of one analysis, before it is written back
enum Verdict {
    Completed { host: String, payload: Value, cache_hit: bool },
    Failed { host: Option<String>, reason: String, cache_hit: bool },
}

impl Analyzer {
    pub fn new(
        analyses: Arc<dyn AnalysisStore>,
        offers: Arc<dyn OfferStore>,
        cache: DomainCache,
        source: Option<Arc<dyn TrafficSource>>,
        recorder: EventRecorder,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            analyses,
            offers,
            cache,
            source,
            recorder,
            retry,
        }
    }

    /// Insert a pending analysis and start it in the background.
    /// Fails with NotFound unless the caller owns the offer, and with
    /// AlreadyExists when the caller's offer has an active analysis.
    pub async fn create(
        self: &Arc<Self>,
        user_id: &str,
        offer_id: &str,
        idempotency_key: Option<&str>,
    ) -> ServiceResult<Analysis> {
        let offer_id = offer_id.trim();
        if offer_id.is_empty() {
            return Err(ServiceError::InvalidArgument("offerId is required".into()));
        }
        match self.offers.get_offer(offer_id).await? {
            Some(offer) if offer.user_id == user_id => {}
            _ => return Err(ServiceError::NotFound(format!("offer {} not found", offer_id))),
        }

        let analysis = Analysis::pending(user_id, offer_id);
        self.analyses.create_analysis(&analysis).await?;

        let requested = Envelope::new(
            EVENT_SOURCE,
            SiterankRequestedData {
                analysis_id: analysis.id.to_string(),
                offer_id: analysis.offer_id.clone(),
                user_id: analysis.user_id.clone(),
                extra: Map::new(),
            },
        )
        .with_subject(analysis.id.to_string());
        if let Err(e) = self.recorder.record(&requested, idempotency_key).await {
            tracing::error!(analysis_id = %analysis.id, "Failed to record SiterankRequested: {}", e);
        }

        self.spawn(analysis.clone(), idempotency_key.map(str::to_string));
        Ok(analysis)
    }

    /// Record an offer announced on the bus so the ownership check sees it
    pub async fn adopt_offer(&self, offer: &Offer) -> ServiceResult<()> {
        match self.offers.create_offer(offer).await {
            Ok(()) | Err(StoreError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Analysis by id, only when owned by the caller
    pub async fn get_owned(&self, id: Uuid, user_id: &str) -> ServiceResult<Analysis> {
        match self.analyses.get_analysis(id).await? {
            Some(analysis) if analysis.user_id == user_id => Ok(analysis),
            _ => Err(ServiceError::NotFound(format!("analysis {} not found", id))),
        }
    }

    /// Newest analysis of the caller for an offer
    pub async fn latest(&self, offer_id: &str, user_id: &str) -> ServiceResult<Analysis> {
        self.analyses
            .latest_for_offer(offer_id, Some(user_id))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no analysis for offer {}", offer_id)))
    }

    fn spawn(self: &Arc<Self>, analysis: Analysis, idempotency_key: Option<String>) {
        let this = self.clone();
        tokio::spawn(async move {
            let key = idempotency_key.as_deref();
            if let Err(e) = catch_panic(this.perform(&analysis, key)).await {
                tracing::error!(analysis_id = %analysis.id, "Siterank analysis aborted: {}", e);
                let verdict = Verdict::Failed {
                    host: None,
                    reason: e.to_string(),
                    cache_hit: false,
                };
                if let Err(e) = this.finish(&analysis, verdict, key).await {
                    tracing::error!(analysis_id = %analysis.id, "Failed to mark analysis failed: {}", e);
                }
            }
        });
    }

    /// Drive one analysis to a terminal status
    #[instrument(skip(self, analysis, idempotency_key), fields(analysis_id = %analysis.id, offer_id = %analysis.offer_id))]
    pub async fn perform(&self, analysis: &Analysis, idempotency_key: Option<&str>) -> anyhow::Result<()> {
        self.analyses.mark_running(analysis.id).await?;
        let verdict = self.evaluate(analysis).await?;
        self.finish(analysis, verdict, idempotency_key).await
    }

    async fn evaluate(&self, analysis: &Analysis) -> anyhow::Result<Verdict> {
        let offer = match self.offers.get_offer(&analysis.offer_id).await? {
            Some(offer) if offer.user_id == analysis.user_id => offer,
            _ => return Ok(Verdict::Failed {
                host: None,
                reason: format!("offer {} not found", analysis.offer_id),
                cache_hit: false,
            }),
        };
        let Some(host) = host_of(&offer.url) else {
            return Ok(Verdict::Failed {
                host: None,
                reason: format!("invalid offer url: {}", offer.url),
                cache_hit: false,
            });
        };

        if let Some(entry) = self.cache.get(&host).await? {
            tracing::debug!(host = %host, ok = entry.ok, "Domain cache hit");
            return Ok(if entry.ok {
                Verdict::Completed {
                    host,
                    payload: entry.payload,
                    cache_hit: true,
                }
            } else {
                Verdict::Failed {
                    reason: cached_reason(&entry.payload),
                    host: Some(host),
                    cache_hit: true,
                }
            });
        }

        let Some(source) = &self.source else {
            return Ok(Verdict::Failed {
                host: Some(host),
                reason: "SIMILARWEB_BASE_URL not configured".into(),
                cache_hit: false,
            });
        };

        match self.retry.run(|_| source.fetch(&host)).await {
            Ok(payload) => {
                self.cache
                    .put(DomainCacheEntry::new(&host, payload.clone(), true))
                    .await;
                Ok(Verdict::Completed {
                    host,
                    payload,
                    cache_hit: false,
                })
            }
            Err(e) => {
                let reason = e.to_string();
                self.cache
                    .put(DomainCacheEntry::new(&host, json!({ "error": reason }), false))
                    .await;
                Ok(Verdict::Failed {
                    host: Some(host),
                    reason,
                    cache_hit: false,
                })
            }
        }
    }

    async fn finish(&self, analysis: &Analysis, verdict: Verdict, idempotency_key: Option<&str>) -> anyhow::Result<()> {
        let completed = match verdict {
            Verdict::Completed {
                host,
                payload,
                cache_hit,
            } => {
                let result = json!({ "host": host, "cacheHit": cache_hit, "traffic": payload });
                self.analyses.mark_completed(analysis.id, result).await?;
                tracing::info!(host = %host, cache_hit, "Siterank analysis completed");
                completed_data(analysis, AnalysisStatus::Completed, Some(host), cache_hit, None)
            }
            Verdict::Failed {
                host,
                reason,
                cache_hit,
            } => {
                self.analyses.mark_failed(analysis.id, &reason).await?;
                tracing::warn!(host = ?host, cache_hit, reason = %reason, "Siterank analysis failed");
                completed_data(analysis, AnalysisStatus::Failed, host, cache_hit, Some(reason))
            }
        };

        let envelope = Envelope::new(EVENT_SOURCE, completed).with_subject(analysis.id.to_string());
        self.recorder.record(&envelope, idempotency_key).await?;
        Ok(())
    }
}

fn completed_data(
    analysis: &Analysis,
    status: AnalysisStatus,
    host: Option<String>,
    cache_hit: bool,
    error: Option<String>,
) -> SiterankCompletedData {
    SiterankCompletedData {
        analysis_id: analysis.id.to_string(),
        offer_id: analysis.offer_id.clone(),
        user_id: analysis.user_id.clone(),
        status: status.to_string(),
        cache_hit,
        host,
        error,
        extra: Map::new(),
    }
}

fn cached_reason(payload: &Value) -> String {
    payload
        .get("error")
        .and_then(Value::as_str)
        .map(|e| format!("cached upstream failure: {}", e))
        .unwrap_or_else(|| "cached upstream failure".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use autoads_core::events::SITERANK_COMPLETED;
    use autoads_core::memory::{InMemoryBus, InMemoryStore};
    use autoads_core::{DomainCacheStore, UpstreamError};
    use chrono::Utc;
    use parking_lot::Mutex;

    /// Scripted upstream: pops one result per call
    struct Scripted {
        calls: Mutex<Vec<String>>,
        results: Mutex<Vec<Result<Value, UpstreamError>>>,
    }

    impl Scripted {
        fn new(results: Vec<Result<Value, UpstreamError>>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                results: Mutex::new(results),
            })
        }
    }

    #[async_trait]
    impl TrafficSource for Scripted {
        async fn fetch(&self, host: &str) -> Result<Value, UpstreamError> {
            self.calls.lock().push(host.to_string());
            let mut results = self.results.lock();
            if results.is_empty() {
                Ok(json!({}))
            } else {
                results.remove(0)
            }
        }
    }

    struct Fixture {
        analyzer: Arc<Analyzer>,
        store: Arc<InMemoryStore>,
        bus: Arc<InMemoryBus>,
    }

    async fn fixture(source: Option<Arc<dyn TrafficSource>>) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());
        for (id, owner, url) in [
            ("o1", "u1", "https://foo.com/landing"),
            ("o2", "u1", "foo.com"),
            ("bad", "u1", "::::"),
            ("theirs", "u2", "https://private.example"),
        ] {
            store
                .create_offer(&Offer {
                    id: id.into(),
                    user_id: owner.into(),
                    name: None,
                    url: url.into(),
                    status: Offer::STATUS_ACTIVE.into(),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        let analyzer = Arc::new(Analyzer::new(
            store.clone(),
            store.clone(),
            DomainCache::new(store.clone()),
            source,
            EventRecorder::new(store.clone(), bus.clone()),
            RetryPolicy::no_retry(),
        ));
        Fixture { analyzer, store, bus }
    }

    async fn run(f: &Fixture, offer_id: &str) -> Analysis {
        let analysis = Analysis::pending("u1", offer_id);
        f.store.create_analysis(&analysis).await.unwrap();
        f.analyzer.perform(&analysis, None).await.unwrap();
        f.store.get_analysis(analysis.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_completes_and_caches_host() {
        let source = Scripted::new(vec![Ok(json!({ "visits": 1200 }))]);
        let f = fixture(Some(source.clone())).await;

        let first = run(&f, "o1").await;
        assert_eq!(first.status, AnalysisStatus::Completed);
        assert_eq!(first.result.as_ref().unwrap()["traffic"]["visits"], 1200);
        assert!(first.started_at.is_some());

        let second = run(&f, "o2").await;
        assert_eq!(second.status, AnalysisStatus::Completed);
        assert_eq!(second.result.as_ref().unwrap()["cacheHit"], true);
        assert_eq!(source.calls.lock().as_slice(), ["foo.com"]);

        let events = f.bus.published_of(SITERANK_COMPLETED);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].data["cacheHit"], true);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_cached_for_a_day() {
        let source = Scripted::new(vec![Err(UpstreamError::Http {
            status: 404,
            message: "unknown domain".into(),
        })]);
        let f = fixture(Some(source.clone())).await;

        let first = run(&f, "o1").await;
        assert_eq!(first.status, AnalysisStatus::Failed);
        assert!(first.error.as_deref().unwrap().contains("404"));

        let entry = f.store.get_domain("foo.com").await.unwrap().unwrap();
        assert!(!entry.ok);
        assert_eq!(entry.expires_at - entry.updated_at, chrono::Duration::days(1));

        // Cached failure short-circuits too
        let second = run(&f, "o2").await;
        assert_eq!(second.status, AnalysisStatus::Failed);
        assert_eq!(source.calls.lock().len(), 1);

        let events = f.bus.published_of(SITERANK_COMPLETED);
        assert_eq!(events[1].data["status"], "failed");
        assert_eq!(events[1].data["cacheHit"], true);
    }

    #[tokio::test]
    async fn test_bad_url_and_missing_offer_fail() {
        let f = fixture(None).await;
        let bad = run(&f, "bad").await;
        assert_eq!(bad.status, AnalysisStatus::Failed);
        assert!(bad.error.unwrap().starts_with("invalid offer url"));

        let missing = run(&f, "nope").await;
        assert_eq!(missing.status, AnalysisStatus::Failed);
        assert_eq!(missing.error.as_deref(), Some("offer nope not found"));
    }

    #[tokio::test]
    async fn test_unconfigured_upstream_is_not_cached() {
        let f = fixture(None).await;
        let analysis = run(&f, "o1").await;
        assert_eq!(analysis.status, AnalysisStatus::Failed);
        assert!(f.store.get_domain("foo.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_second_active_analysis() {
        let f = fixture(None).await;
        f.store.create_analysis(&Analysis::pending("u1", "o1")).await.unwrap();

        let err = f.analyzer.create("u1", "o1", None).await.unwrap_err();
        assert!(err.is_already_exists());
        assert!(matches!(
            f.analyzer.create("u1", "  ", None).await,
            Err(ServiceError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_create_requires_offer_ownership() {
        let f = fixture(None).await;

        let err = f.analyzer.create("u1", "theirs", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        let err = f.analyzer.create("u1", "nope", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(f.store.latest_for_offer("theirs", None).await.unwrap().is_none());

        // The owner is not blocked by the rejected attempts
        let own = f.analyzer.create("u2", "theirs", None).await.unwrap();
        assert_eq!(own.user_id, "u2");
    }

    #[tokio::test]
    async fn test_foreign_analysis_never_reads_the_offer() {
        let source = Scripted::new(Vec::new());
        let f = fixture(Some(source.clone())).await;

        let analysis = run(&f, "theirs").await;
        assert_eq!(analysis.status, AnalysisStatus::Failed);
        assert_eq!(analysis.error.as_deref(), Some("offer theirs not found"));
        assert!(analysis.result.is_none());
        assert!(source.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_adopt_offer_is_idempotent() {
        let f = fixture(None).await;
        let offer = Offer {
            id: "o7".into(),
            user_id: "u1".into(),
            name: None,
            url: "https://baz.com".into(),
            status: Offer::STATUS_ACTIVE.into(),
            created_at: Utc::now(),
        };
        f.analyzer.adopt_offer(&offer).await.unwrap();
        f.analyzer.adopt_offer(&offer).await.unwrap();
        assert_eq!(f.store.get_offer("o7").await.unwrap().unwrap().url, "https://baz.com");
    }
}
