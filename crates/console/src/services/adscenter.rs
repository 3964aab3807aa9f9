// Bulk-action proxy to adscenter
//
// The console acts for the operation's owner: the owner is read from the
// bulk operation row and sent upstream as X-User-Id.

use std::sync::Arc;
use std::time::Duration;

use autoads_core::{BulkActionStore, UpstreamError};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};

pub const PROXY_TIMEOUT: Duration = Duration::from_secs(30);
const BULK_ACTIONS_PATH: &str = "/api/v1/adscenter/bulk-actions";
const USER_ID_HEADER: &str = "x-user-id";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Upstream answer relayed verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct Relayed {
    pub status: u16,
    pub body: Value,
}

pub struct AdscenterProxy {
    http: reqwest::Client,
    base_url: Option<String>,
    bulk: Arc<dyn BulkActionStore>,
}

impl AdscenterProxy {
    pub fn new(base_url: Option<String>, bulk: Arc<dyn BulkActionStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            bulk,
        }
    }

    async fn owner(&self, operation_id: Uuid) -> ServiceResult<String> {
        self.bulk
            .get_operation(operation_id)
            .await?
            .map(|operation| operation.user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Bulk action {} not found", operation_id)))
    }

    /// Forward `suffix` of one operation (`/snapshots`, `/deadletters/...`) as its owner
    pub async fn forward(
        &self,
        method: reqwest::Method,
        operation_id: Uuid,
        suffix: &str,
        body: Option<Value>,
        request_id: Option<String>,
    ) -> ServiceResult<Relayed> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| ServiceError::NotConfigured("ADSCENTER_URL is not set".into()))?;
        let owner = self.owner(operation_id).await?;

        let url = format!("{}{}/{}{}", base, BULK_ACTIONS_PATH, operation_id, suffix);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .timeout(PROXY_TIMEOUT)
            .header(USER_ID_HEADER, &owner);
        if let Some(id) = request_id {
            request = request.header(REQUEST_ID_HEADER, id);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Transport(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode(e.to_string()))?
        };
        tracing::info!(%method, %operation_id, owner = %owner, status, "Proxied bulk action call");
        Ok(Relayed { status, body })
    }
}
