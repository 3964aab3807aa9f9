// Offline Ads client: accepts everything, changes nothing

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{AdsApi, AdsResult, AdsSession};

/// Mutations are recorded so tests can inspect what would have been sent
#[derive(Default)]
pub struct StubAdsClient {
    mutations: Mutex<Vec<(String, Vec<Value>, bool)>>,
}

impl StubAdsClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(customer_id, operations, validate_only)` per mutate call
    pub fn mutations(&self) -> Vec<(String, Vec<Value>, bool)> {
        self.mutations.lock().clone()
    }
}

#[async_trait]
impl AdsApi for StubAdsClient {
    fn is_live(&self) -> bool {
        false
    }

    async fn list_accessible_customers(&self, _session: &AdsSession) -> AdsResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn search_stream(
        &self,
        _session: &AdsSession,
        _customer_id: &str,
        _query: &str,
    ) -> AdsResult<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn mutate(
        &self,
        _session: &AdsSession,
        customer_id: &str,
        operations: &[Value],
        validate_only: bool,
    ) -> AdsResult<Value> {
        self.mutations
            .lock()
            .push((customer_id.to_string(), operations.to_vec(), validate_only));
        Ok(json!({
            "stub": true,
            "validateOnly": validate_only,
            "mutateOperationResponses": [],
        }))
    }

    async fn mutate_manager_links(
        &self,
        _session: &AdsSession,
        _customer_id: &str,
        _operations: &[Value],
    ) -> AdsResult<Value> {
        Ok(json!({ "stub": true, "status": "queued", "results": [] }))
    }
}
