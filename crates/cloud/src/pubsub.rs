// Pub/Sub event bus over REST
//
// PubSubPublisher implements EventPublisher; PullSubscriber drives an
// EventHandler with bounded concurrency; PushRequest decodes push deliveries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autoads_core::{BusError, Envelope, EventPublisher};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{check_status, CloudError};
use crate::token::TokenProvider;

pub const DEFAULT_PUBSUB_URL: &str = "https://pubsub.googleapis.com/v1";
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_OUTSTANDING: usize = 100;

/// Upper bound the API accepts for a single pull
const MAX_PULL_BATCH: usize = 100;

/// Handles one decoded envelope; an error nacks the message for redelivery
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<()>;
}

/// Pub/Sub settings shared by publisher and subscriber
#[derive(Debug, Clone)]
pub struct PubSubConfig {
    pub project: String,
    pub topic: Option<String>,
    pub subscription: Option<String>,
    pub base_url: String,
    /// Set when `PUBSUB_EMULATOR_HOST` is in use; calls go out unauthenticated
    pub emulator: bool,
    pub concurrency: usize,
    pub max_outstanding: usize,
}

impl PubSubConfig {
    /// Returns None without `GOOGLE_CLOUD_PROJECT`
    pub fn from_env() -> Option<Self> {
        let project = std::env::var("GOOGLE_CLOUD_PROJECT")
            .ok()
            .filter(|p| !p.is_empty())?;
        let emulator_host = std::env::var("PUBSUB_EMULATOR_HOST")
            .ok()
            .filter(|h| !h.is_empty());
        let base_url = match &emulator_host {
            Some(host) => format!("http://{}/v1", host),
            None => DEFAULT_PUBSUB_URL.to_string(),
        };
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        Some(Self {
            project,
            topic: non_empty("PUBSUB_TOPIC_ID"),
            subscription: non_empty("PUBSUB_SUBSCRIPTION_ID"),
            base_url,
            emulator: emulator_host.is_some(),
            concurrency: std::env::var("PUBSUB_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_CONCURRENCY),
            max_outstanding: std::env::var("PUBSUB_MAX_OUTSTANDING")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_OUTSTANDING),
        })
    }

    /// Token provider matching the target: anonymous for the emulator
    pub fn token_provider(&self) -> TokenProvider {
        if self.emulator {
            TokenProvider::anonymous()
        } else {
            TokenProvider::from_env()
        }
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

// ============================================================================
// Publisher
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

pub struct PubSubPublisher {
    http: reqwest::Client,
    base_url: String,
    topic_path: String,
    tokens: Arc<TokenProvider>,
}

impl PubSubPublisher {
    pub fn new(base_url: &str, project: &str, topic: &str, tokens: Arc<TokenProvider>) -> Self {
        Self {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            topic_path: format!("projects/{}/topics/{}", project, topic),
            tokens,
        }
    }

    pub fn from_config(config: &PubSubConfig, tokens: Arc<TokenProvider>) -> Result<Self, CloudError> {
        let topic = config
            .topic
            .as_deref()
            .ok_or_else(|| CloudError::NotConfigured("PUBSUB_TOPIC_ID is not set".into()))?;
        Ok(Self::new(&config.base_url, &config.project, topic, tokens))
    }

    pub fn topic_path(&self) -> &str {
        &self.topic_path
    }
}

#[async_trait]
impl EventPublisher for PubSubPublisher {
    #[instrument(skip(self, envelope, idempotency_key), fields(event_id = %envelope.id, event_type = %envelope.event_type))]
    async fn publish(
        &self,
        envelope: &Envelope,
        idempotency_key: Option<&str>,
    ) -> Result<String, BusError> {
        let data = envelope
            .to_bytes()
            .map_err(|e| BusError::Encoding(e.to_string()))?;
        let body = json!({
            "messages": [{
                "data": STANDARD.encode(data),
                "attributes": envelope.attributes(idempotency_key),
            }]
        });

        let url = format!("{}/{}:publish", self.base_url, self.topic_path);
        let request = self.tokens.authorize(self.http.post(&url).json(&body)).await?;
        let response = request.send().await.map_err(CloudError::from)?;
        let response = check_status(response, &self.topic_path).await?;
        let published: PublishResponse = response.json().await.map_err(CloudError::from)?;

        let message_id = published
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| BusError::Publish("broker returned no message id".into()))?;
        debug!(message_id = %message_id, "Published event");
        Ok(message_id)
    }
}

// ============================================================================
// Push delivery
// ============================================================================

/// Message body of a push delivery
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default, rename = "messageId", alias = "message_id")]
    pub message_id: Option<String>,
    #[serde(default, rename = "publishTime", alias = "publish_time")]
    pub publish_time: Option<String>,
}

/// JSON posted by a push subscription
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushRequest {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

impl PushRequest {
    /// Decode the base64 payload into an envelope
    pub fn into_envelope(self) -> Result<Envelope, CloudError> {
        let raw = self.message.data.unwrap_or_default();
        let bytes = STANDARD
            .decode(raw.trim().as_bytes())
            .map_err(|e| CloudError::Decode(format!("message data is not base64: {}", e)))?;
        Ok(Envelope::from_message(
            &bytes,
            &self.message.attributes,
            self.message.message_id.as_deref(),
        ))
    }
}

// ============================================================================
// Pull subscriber
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<ReceivedMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedMessage {
    ack_id: String,
    message: PushMessage,
}

pub struct PullSubscriber {
    http: reqwest::Client,
    base_url: String,
    subscription_path: String,
    tokens: Arc<TokenProvider>,
    concurrency: usize,
    max_outstanding: usize,
    idle_backoff: Duration,
}

impl PullSubscriber {
    pub fn new(
        base_url: &str,
        project: &str,
        subscription: &str,
        tokens: Arc<TokenProvider>,
    ) -> Self {
        Self {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            subscription_path: format!("projects/{}/subscriptions/{}", project, subscription),
            tokens,
            concurrency: DEFAULT_CONCURRENCY,
            max_outstanding: DEFAULT_MAX_OUTSTANDING,
            idle_backoff: Duration::from_secs(1),
        }
    }

    pub fn from_config(config: &PubSubConfig, tokens: Arc<TokenProvider>) -> Result<Self, CloudError> {
        let subscription = config.subscription.as_deref().ok_or_else(|| {
            CloudError::NotConfigured("PUBSUB_SUBSCRIPTION_ID is not set".into())
        })?;
        Ok(Self::new(&config.base_url, &config.project, subscription, tokens)
            .with_limits(config.concurrency, config.max_outstanding))
    }

    pub fn with_limits(mut self, concurrency: usize, max_outstanding: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self.max_outstanding = max_outstanding.max(1);
        self
    }

    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    async fn pull(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>, CloudError> {
        let url = format!("{}/{}:pull", self.base_url, self.subscription_path);
        let body = json!({ "maxMessages": max_messages });
        let request = self.tokens.authorize(self.http.post(&url).json(&body)).await?;
        let response = request.send().await?;
        let response = check_status(response, &self.subscription_path).await?;
        let pulled: PullResponse = response.json().await?;
        Ok(pulled.received_messages)
    }

    async fn acknowledge(&self, ack_id: &str) -> Result<(), CloudError> {
        let url = format!("{}/{}:acknowledge", self.base_url, self.subscription_path);
        let body = json!({ "ackIds": [ack_id] });
        let request = self.tokens.authorize(self.http.post(&url).json(&body)).await?;
        check_status(request.send().await?, &self.subscription_path).await?;
        Ok(())
    }

    /// Negative acknowledge: an ack deadline of zero makes the message eligible for redelivery
    async fn nack(&self, ack_id: &str) -> Result<(), CloudError> {
        let url = format!("{}/{}:modifyAckDeadline", self.base_url, self.subscription_path);
        let body = json!({ "ackIds": [ack_id], "ackDeadlineSeconds": 0 });
        let request = self.tokens.authorize(self.http.post(&url).json(&body)).await?;
        check_status(request.send().await?, &self.subscription_path).await?;
        Ok(())
    }

    async fn process(&self, handler: &dyn EventHandler, received: ReceivedMessage) {
        let ReceivedMessage { ack_id, message } = received;
        let payload = match message.data.as_deref().map(|d| STANDARD.decode(d.as_bytes())) {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                warn!(error = %e, "Dropping message with undecodable data");
                if let Err(e) = self.acknowledge(&ack_id).await {
                    error!("Failed to ack undecodable message: {}", e);
                }
                return;
            }
            None => Vec::new(),
        };

        let envelope = Envelope::from_message(&payload, &message.attributes, message.message_id.as_deref());
        let event_id = envelope.id.clone();
        let event_type = envelope.event_type.clone();

        match handler.handle(envelope).await {
            Ok(()) => {
                if let Err(e) = self.acknowledge(&ack_id).await {
                    error!(event_id = %event_id, "Failed to ack message: {}", e);
                }
            }
            Err(e) => {
                warn!(event_id = %event_id, event_type = %event_type, error = %e, "Handler failed, nacking");
                if let Err(e) = self.nack(&ack_id).await {
                    error!(event_id = %event_id, "Failed to nack message: {}", e);
                }
            }
        }
    }

    /// Pull and dispatch until cancelled. In-flight handlers finish before return.
    pub async fn run(self: Arc<Self>, handler: Arc<dyn EventHandler>, cancel: CancellationToken) {
        let outstanding = Arc::new(Semaphore::new(self.max_outstanding));
        let workers = Arc::new(Semaphore::new(self.concurrency));
        let tracker = TaskTracker::new();

        info!(
            subscription = %self.subscription_path,
            concurrency = self.concurrency,
            max_outstanding = self.max_outstanding,
            "Subscriber started"
        );

        loop {
            // Wait for at least one free slot before pulling more
            let first = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = outstanding.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let capacity = (outstanding.available_permits() + 1).min(MAX_PULL_BATCH);

            let pulled = tokio::select! {
                _ = cancel.cancelled() => break,
                pulled = self.pull(capacity) => pulled,
            };

            let messages = match pulled {
                Ok(messages) if !messages.is_empty() => messages,
                other => {
                    if let Err(e) = other {
                        warn!(error = %e, "Pull failed");
                    }
                    drop(first);
                    let stopped = tokio::select! {
                        _ = cancel.cancelled() => true,
                        _ = tokio::time::sleep(self.idle_backoff) => false,
                    };
                    if stopped {
                        break;
                    }
                    continue;
                }
            };

            let mut first = Some(first);
            for received in messages {
                let slot = match first.take() {
                    Some(permit) => permit,
                    None => match outstanding.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };
                let subscriber = self.clone();
                let handler = handler.clone();
                let workers = workers.clone();
                tracker.spawn(async move {
                    let _slot = slot;
                    let Ok(_worker) = workers.acquire_owned().await else {
                        return;
                    };
                    subscriber.process(handler.as_ref(), received).await;
                });
            }
        }

        tracker.close();
        tracker.wait().await;
        info!(subscription = %self.subscription_path, "Subscriber stopped");
    }
}
