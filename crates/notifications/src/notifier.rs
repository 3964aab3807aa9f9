// Notification writer
//
// Consumes envelopes from the pull subscriber or push deliveries, writes one
// row per event and announces it as NotificationCreated.

use std::sync::Arc;

use async_trait::async_trait;
use autoads_cloud::EventHandler;
use autoads_core::events::{EventData, NotificationData};
use autoads_core::idempotency::{scope, IdempotencyKey};
use autoads_core::notification::Notification;
use autoads_core::{Envelope, EventRecorder, IdempotencyStore, NotificationStore, StoreError};
use autoads_server::idempotency;
use serde_json::Map;
use tracing::instrument;

use crate::compose::compose;

pub const EVENT_SOURCE: &str = "notifications";

pub struct Notifier {
    notifications: Arc<dyn NotificationStore>,
    idempotency: Arc<dyn IdempotencyStore>,
    recorder: EventRecorder,
}

impl Notifier {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        recorder: EventRecorder,
    ) -> Self {
        Self {
            notifications,
            idempotency,
            recorder,
        }
    }

    /// Write the notification for an event. None when the event does not
    /// notify or was already handled.
    #[instrument(skip(self, envelope), fields(event_id = %envelope.id, event_type = %envelope.event_type))]
    pub async fn notify(&self, envelope: &Envelope) -> Result<Option<Notification>, StoreError> {
        let Some(new) = compose(envelope) else {
            return Ok(None);
        };

        let key = IdempotencyKey::parse(&envelope.id);
        if idempotency::lookup(&self.idempotency, key.as_ref(), &new.user_id, scope::NOTIFICATIONS_EVENT)
            .await?
            .is_some()
        {
            tracing::debug!("Event already notified");
            return Ok(None);
        }

        let notification = self.notifications.insert_notification(&new).await?;
        idempotency::bind(
            &self.idempotency,
            key.as_ref(),
            &new.user_id,
            scope::NOTIFICATIONS_EVENT,
            &notification.id.to_string(),
        )
        .await;
        tracing::info!(
            notification_id = notification.id,
            user_id = %notification.user_id,
            severity = %notification.message.severity,
            "Notification created"
        );

        let created = Envelope::new(
            EVENT_SOURCE,
            EventData::NotificationCreated(NotificationData {
                notification_id: notification.id.to_string(),
                user_id: notification.user_id.clone(),
                notification_type: Some(notification.notification_type.clone()),
                extra: Map::new(),
            }),
        )
        .with_subject(notification.id.to_string());
        if let Err(e) = self.recorder.record(&created, None).await {
            tracing::warn!(notification_id = notification.id, "Failed to record NotificationCreated: {}", e);
        }

        Ok(Some(notification))
    }
}

#[async_trait]
impl EventHandler for Notifier {
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<()> {
        self.notify(&envelope).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoads_core::events::{BatchOpsTaskData, NOTIFICATION_CREATED};
    use autoads_core::memory::{InMemoryBus, InMemoryStore};

    fn notifier(store: Arc<InMemoryStore>, bus: Arc<InMemoryBus>) -> Notifier {
        Notifier::new(store.clone(), store.clone(), EventRecorder::new(store, bus))
    }

    fn failed_batch() -> Envelope {
        Envelope::new(
            "adscenter",
            EventData::BatchOpsTaskFailed(BatchOpsTaskData {
                operation_id: "op1".into(),
                user_id: "u1".into(),
                status: Some("failed".into()),
                summary: None,
                error: Some("quota exhausted".into()),
                extra: Map::new(),
            }),
        )
    }

    #[tokio::test]
    async fn test_redelivery_notifies_once() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let notifier = notifier(store.clone(), bus.clone());
        let envelope = failed_batch();

        let first = notifier.notify(&envelope).await.unwrap().unwrap();
        assert_eq!(first.message.category, "bulk");
        assert!(notifier.notify(&envelope).await.unwrap().is_none());

        assert_eq!(store.recent("u1", 20, None).await.unwrap().len(), 1);
        let created = bus.published_of(NOTIFICATION_CREATED);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].data["notificationId"], first.id.to_string());
    }
}
