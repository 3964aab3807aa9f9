// Bus consumer: every new offer gets an analysis without waiting for a client call

use std::sync::Arc;

use async_trait::async_trait;
use autoads_cloud::EventHandler;
use autoads_core::offer::Offer;
use autoads_core::{Envelope, EventData};

use super::Analyzer;
use crate::error::ServiceError;

pub struct OfferCreatedHandler {
    analyzer: Arc<Analyzer>,
}

impl OfferCreatedHandler {
    pub fn new(analyzer: Arc<Analyzer>) -> Self {
        Self { analyzer }
    }
}

#[async_trait]
impl EventHandler for OfferCreatedHandler {
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<()> {
        let EventData::OfferCreated(offer) = envelope.event() else {
            return Ok(());
        };
        self.analyzer
            .adopt_offer(&Offer {
                id: offer.offer_id.clone(),
                user_id: offer.user_id.clone(),
                name: offer.name.clone(),
                url: offer.url.clone(),
                status: Offer::STATUS_ACTIVE.into(),
                created_at: envelope.time,
            })
            .await?;
        match self.analyzer.create(&offer.user_id, &offer.offer_id, None).await {
            Ok(analysis) => {
                tracing::info!(
                    analysis_id = %analysis.id,
                    offer_id = %offer.offer_id,
                    event_id = %envelope.id,
                    "Analysis started from OfferCreated"
                );
                Ok(())
            }
            // Redelivery, or a client already asked
            Err(e) if e.is_already_exists() => Ok(()),
            // Offer id already taken by another user; redelivery cannot fix it
            Err(ServiceError::NotFound(reason)) => {
                tracing::warn!(offer_id = %offer.offer_id, event_id = %envelope.id, "Skipping OfferCreated: {}", reason);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoads_core::events::{OfferCreatedData, SiterankRequestedData, SITERANK_REQUESTED};
    use autoads_core::memory::{InMemoryBus, InMemoryStore};
    use autoads_core::ratelimit::RetryPolicy;
    use autoads_core::{AnalysisStore, EventRecorder, OfferStore};
    use serde_json::Map;

    use crate::services::DomainCache;

    #[tokio::test]
    async fn test_offer_created_starts_one_analysis() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let analyzer = Arc::new(Analyzer::new(
            store.clone(),
            store.clone(),
            DomainCache::new(store.clone()),
            None,
            EventRecorder::new(store.clone(), bus.clone()),
            RetryPolicy::no_retry(),
        ));
        let handler = OfferCreatedHandler::new(analyzer);

        let created = Envelope::new(
            "offers",
            OfferCreatedData {
                offer_id: "o1".into(),
                user_id: "u1".into(),
                url: "https://foo.com".into(),
                name: None,
                extra: Map::new(),
            },
        );
        handler.handle(created.clone()).await.unwrap();
        assert!(store.latest_for_offer("o1", Some("u1")).await.unwrap().is_some());
        assert_eq!(bus.published_of(SITERANK_REQUESTED).len(), 1);

        // Other event types are ignored
        let unrelated = Envelope::new(
            "siterank",
            SiterankRequestedData {
                analysis_id: "a1".into(),
                offer_id: "o9".into(),
                user_id: "u1".into(),
                extra: Map::new(),
            },
        );
        handler.handle(unrelated).await.unwrap();
        assert!(store.latest_for_offer("o9", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offer_claimed_by_another_user_is_acked_without_analysis() {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_offer(&Offer {
                id: "o5".into(),
                user_id: "u2".into(),
                name: None,
                url: "https://private.example".into(),
                status: Offer::STATUS_ACTIVE.into(),
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        let analyzer = Arc::new(Analyzer::new(
            store.clone(),
            store.clone(),
            DomainCache::new(store.clone()),
            None,
            EventRecorder::new(store.clone(), Arc::new(InMemoryBus::new())),
            RetryPolicy::no_retry(),
        ));
        let handler = OfferCreatedHandler::new(analyzer);

        let spoofed = Envelope::new(
            "offers",
            OfferCreatedData {
                offer_id: "o5".into(),
                user_id: "u1".into(),
                url: "https://attacker.example".into(),
                name: None,
                extra: Map::new(),
            },
        );
        handler.handle(spoofed).await.unwrap();
        assert!(store.latest_for_offer("o5", None).await.unwrap().is_none());
        assert_eq!(store.get_offer("o5").await.unwrap().unwrap().user_id, "u2");
    }
}
