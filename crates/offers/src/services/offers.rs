// Offer intake: validate, persist, emit OfferCreated

use std::sync::Arc;

use autoads_core::events::{EventData, OfferCreatedData};
use autoads_core::offer::Offer;
use autoads_core::{Envelope, EventRecorder, OfferStore};
use chrono::Utc;
use serde_json::Map;
use tracing::instrument;
use url::Url;
use uuid::Uuid;

use super::EVENT_SOURCE;
use crate::error::{ServiceError, ServiceResult};

pub struct OfferService {
    offers: Arc<dyn OfferStore>,
    recorder: EventRecorder,
}

/// Landing URL must be absolute http(s) with a host
fn validate_url(raw: &str) -> ServiceResult<String> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed)
        .map_err(|e| ServiceError::InvalidArgument(format!("url is not valid: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ServiceError::InvalidArgument(
            "url must be an http(s) URL with a host".into(),
        ));
    }
    Ok(trimmed.to_string())
}

impl OfferService {
    pub fn new(offers: Arc<dyn OfferStore>, recorder: EventRecorder) -> Self {
        Self { offers, recorder }
    }

    #[instrument(skip(self, name, url))]
    pub async fn create(
        &self,
        user_id: &str,
        name: Option<&str>,
        url: &str,
        idempotency_key: Option<&str>,
    ) -> ServiceResult<Offer> {
        let url = validate_url(url)?;
        let offer = Offer {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.to_string(),
            name: name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
            url,
            status: Offer::STATUS_ACTIVE.to_string(),
            created_at: Utc::now(),
        };
        self.offers.create_offer(&offer).await?;

        let envelope = Envelope::new(
            EVENT_SOURCE,
            EventData::OfferCreated(OfferCreatedData {
                offer_id: offer.id.clone(),
                user_id: offer.user_id.clone(),
                url: offer.url.clone(),
                name: offer.name.clone(),
                extra: Map::new(),
            }),
        )
        .with_subject(offer.id.clone());
        if let Err(e) = self.recorder.record(&envelope, idempotency_key).await {
            tracing::error!(offer_id = %offer.id, "Failed to record OfferCreated: {}", e);
        }

        tracing::info!(offer_id = %offer.id, "Offer created");
        Ok(offer)
    }

    /// Offer owned by `user_id`; others' offers read as missing
    pub async fn get_owned(&self, id: &str, user_id: &str) -> ServiceResult<Offer> {
        self.offers
            .get_offer(id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Offer {} not found", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoads_core::events::OFFER_CREATED;
    use autoads_core::memory::{InMemoryBus, InMemoryStore};

    fn service() -> (OfferService, Arc<InMemoryBus>) {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let recorder = EventRecorder::new(store.clone(), bus.clone());
        (OfferService::new(store, recorder), bus)
    }

    #[test]
    fn test_url_validation() {
        assert!(validate_url("https://example.com/landing").is_ok());
        assert!(validate_url("  http://example.com ").is_ok());
        assert!(validate_url("example.com").is_err());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("").is_err());
    }

    #[tokio::test]
    async fn test_create_emits_offer_created() {
        let (service, bus) = service();
        let offer = service
            .create("u1", Some(" Spring sale "), "https://example.com", Some("k1"))
            .await
            .unwrap();
        assert_eq!(offer.name.as_deref(), Some("Spring sale"));
        assert_eq!(offer.status, "active");

        let published = bus.published_of(OFFER_CREATED);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].subject.as_deref(), Some(offer.id.as_str()));
        assert_eq!(published[0].data["url"], "https://example.com");
    }

    #[tokio::test]
    async fn test_other_users_offer_is_not_found() {
        let (service, _) = service();
        let offer = service.create("u1", None, "https://example.com", None).await.unwrap();
        assert!(service.get_owned(&offer.id, "u1").await.is_ok());
        assert!(matches!(
            service.get_owned(&offer.id, "u2").await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
