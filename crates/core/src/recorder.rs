// Event recorder
//
// Appends an envelope to the event store, then publishes it. The append is
// the commit point; publishing is best effort and its failure is only logged.

use std::sync::Arc;

use tracing::instrument;

use crate::error::StoreError;
use crate::events::Envelope;
use crate::records::EventRecord;
use crate::traits::{EventPublisher, EventStore};

#[derive(Clone)]
pub struct EventRecorder {
    store: Arc<dyn EventStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl EventRecorder {
    pub fn new(store: Arc<dyn EventStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Append and publish
    #[instrument(skip(self, envelope), fields(event_id = %envelope.id, event_type = %envelope.event_type))]
    pub async fn record(
        &self,
        envelope: &Envelope,
        idempotency_key: Option<&str>,
    ) -> Result<(), StoreError> {
        self.store
            .append(&EventRecord::from_envelope(envelope, idempotency_key))
            .await?;
        self.publish(envelope, idempotency_key).await;
        Ok(())
    }

    /// Publish an envelope whose record was already committed elsewhere
    /// (e.g. inside a ledger transaction)
    pub async fn publish(&self, envelope: &Envelope, idempotency_key: Option<&str>) {
        if let Err(e) = self.publisher.publish(envelope, idempotency_key).await {
            tracing::warn!(
                event_id = %envelope.id,
                event_type = %envelope.event_type,
                error = %e,
                "Failed to publish event after commit"
            );
        }
    }
}
