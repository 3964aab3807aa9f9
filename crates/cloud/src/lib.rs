// AutoAds Google Cloud collaborators
//
// REST clients behind the core traits:
// - SecretManagerClient / SecretCache -> SecretSource
// - PubSubPublisher -> EventPublisher, PullSubscriber + PushRequest for delivery
// - FirestoreDocs -> UiDocStore
// - BigQueryWarehouse -> KeywordWarehouse

pub mod bigquery;
pub mod bootstrap;
pub mod error;
pub mod firestore;
pub mod pubsub;
pub mod secrets;
pub mod token;

pub use bigquery::{BigQueryWarehouse, WarehouseConfig};
pub use bootstrap::{publisher_from_env, secrets_from_env, subscriber_from_env};
pub use error::CloudError;
pub use firestore::FirestoreDocs;
pub use pubsub::{EventHandler, PubSubConfig, PubSubPublisher, PullSubscriber, PushMessage, PushRequest};
pub use secrets::{env_or_secret, SecretCache, SecretManagerClient};
pub use token::TokenProvider;
