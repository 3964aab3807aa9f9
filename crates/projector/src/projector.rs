// Event projection
//
// One row per event id in event_projection. Envelopes carrying a userId are
// mirrored to the UI doc store as users/{uid}/recentEvents/{eventId}.

use std::sync::Arc;

use async_trait::async_trait;
use autoads_cloud::EventHandler;
use autoads_core::{Envelope, EventProjection, ProjectionStore, StoreError, UiDocStore};
use serde_json::{json, Value};
use tracing::instrument;

pub struct Projector {
    projections: Arc<dyn ProjectionStore>,
    docs: Option<Arc<dyn UiDocStore>>,
}

/// Recent-event document as the UI reads it
pub fn recent_event_doc(envelope: &Envelope) -> Value {
    json!({
        "id": envelope.id,
        "type": envelope.event_type,
        "source": envelope.source,
        "subject": envelope.subject,
        "time": envelope.time,
        "data": envelope.data,
    })
}

impl Projector {
    pub fn new(projections: Arc<dyn ProjectionStore>, docs: Option<Arc<dyn UiDocStore>>) -> Self {
        Self { projections, docs }
    }

    /// Project one envelope. Returns false when the event was already projected.
    #[instrument(skip(self, envelope), fields(event_id = %envelope.id, event_type = %envelope.event_type))]
    pub async fn project(&self, envelope: &Envelope) -> Result<bool, StoreError> {
        let inserted = self
            .projections
            .insert_if_absent(&EventProjection::from_envelope(envelope))
            .await?;
        if !inserted {
            tracing::debug!("Event already projected");
        }

        if let (Some(docs), Some(user_id)) = (&self.docs, envelope.user_id()) {
            if let Err(e) = docs
                .put_recent_event(&user_id, &envelope.id, &recent_event_doc(envelope))
                .await
            {
                tracing::warn!(user_id = %user_id, "Failed to mirror recent event: {}", e);
            }
        }
        Ok(inserted)
    }
}

#[async_trait]
impl EventHandler for Projector {
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<()> {
        self.project(&envelope).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoads_core::events::{EventData, OfferCreatedData};
    use autoads_core::memory::{InMemoryStore, InMemoryUiDocs};
    use serde_json::Map;

    fn offer_created(user_id: &str) -> Envelope {
        Envelope::new(
            "offers",
            EventData::OfferCreated(OfferCreatedData {
                offer_id: "o1".into(),
                user_id: user_id.into(),
                url: "https://example.com".into(),
                name: None,
                extra: Map::new(),
            }),
        )
        .with_subject("o1")
    }

    #[tokio::test]
    async fn test_projects_once_and_mirrors_user_events() {
        let store = Arc::new(InMemoryStore::new());
        let docs = Arc::new(InMemoryUiDocs::new());
        let projector = Projector::new(store.clone(), Some(docs.clone()));

        let envelope = offer_created("u1");
        assert!(projector.project(&envelope).await.unwrap());
        assert!(!projector.project(&envelope).await.unwrap());
        assert_eq!(store.projection_count(), 1);

        let mirrored = docs.docs();
        assert_eq!(mirrored.len(), 1);
        assert_eq!(mirrored[0].0, "u1");
        assert_eq!(mirrored[0].1, envelope.id);
        assert_eq!(mirrored[0].2["type"], "OfferCreated");
    }

    #[tokio::test]
    async fn test_events_without_user_are_not_mirrored() {
        let store = Arc::new(InMemoryStore::new());
        let docs = Arc::new(InMemoryUiDocs::new());
        let projector = Projector::new(store, Some(docs.clone()));

        projector.project(&offer_created("")).await.unwrap();
        assert!(docs.docs().is_empty());
    }
}
