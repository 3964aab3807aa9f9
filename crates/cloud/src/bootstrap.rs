// Environment-driven wiring shared by the service binaries

use std::sync::Arc;

use autoads_core::memory::InMemoryBus;
use autoads_core::EventPublisher;

use crate::pubsub::{PubSubConfig, PubSubPublisher, PullSubscriber};
use crate::secrets::{SecretCache, SecretManagerClient};
use crate::token::TokenProvider;

/// Secret cache over Secret Manager when `GOOGLE_CLOUD_PROJECT` is set
pub fn secrets_from_env() -> Option<Arc<SecretCache>> {
    match SecretManagerClient::from_env(Arc::new(TokenProvider::from_env())) {
        Ok(client) => Some(Arc::new(SecretCache::from_env(Arc::new(client)))),
        Err(e) => {
            tracing::debug!("Secret Manager disabled: {}", e);
            None
        }
    }
}

/// Pub/Sub publisher when a topic is configured, else an in-process bus
pub fn publisher_from_env() -> Arc<dyn EventPublisher> {
    if let Some(config) = PubSubConfig::from_env() {
        let tokens = Arc::new(config.token_provider());
        match PubSubPublisher::from_config(&config, tokens) {
            Ok(publisher) => {
                tracing::info!(topic = %publisher.topic_path(), "Publishing events to Pub/Sub");
                return Arc::new(publisher);
            }
            Err(e) => tracing::warn!("Pub/Sub publisher unavailable: {}", e),
        }
    }
    tracing::warn!("PUBSUB_TOPIC_ID not set, events stay in process");
    Arc::new(InMemoryBus::new())
}

/// Pull subscriber when `PUBSUB_SUBSCRIPTION_ID` is set
pub fn subscriber_from_env() -> Option<Arc<PullSubscriber>> {
    let config = PubSubConfig::from_env()?;
    let tokens = Arc::new(config.token_provider());
    match PullSubscriber::from_config(&config, tokens) {
        Ok(subscriber) => Some(Arc::new(subscriber)),
        Err(e) => {
            tracing::info!("Pull subscriber disabled: {}", e);
            None
        }
    }
}
