// Bulk action executor
//
// A bulk operation is accepted synchronously (validated, stored, queued) and
// executed in a background task. Each action becomes mutate operations for
// one customer. Validate-only runs send one `validateOnly` mutate per action.
// Live runs snapshot the targets before and after, mutate in batches of 100,
// and fall back to one call per operation when a batch fails; operations
// that still fail become dead letters.

use std::slice;
use std::sync::Arc;
use std::time::Duration;

use autoads_core::ads::{
    normalize_customer_id, ActionType, BulkAction, BulkOperation, BulkStatus, DeadLetter,
    DeadLetterStatus, Snapshot, SnapshotPhase,
};
use autoads_core::events::{BatchOpsTaskData, EventData};
use autoads_core::task::catch_panic;
use autoads_core::{BulkActionStore, Envelope, EventRecorder};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::ads::{customer_of, AdsApi, AdsError, AdsSession};
use crate::error::{ServiceError, ServiceResult};
use crate::services::browser::{BrowserResolver, DEFAULT_RESOLVE_TIMEOUT};

/// Maximum operations per mutate call
pub const BATCH_SIZE: usize = 100;

const SOURCE: &str = "adscenter";

/// An action turned into mutate operations
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAction {
    pub action_type: ActionType,
    pub customer_id: String,
    pub targets: Vec<String>,
    pub operations: Vec<Value>,
    /// Echoed back in the action result
    pub details: Map<String, Value>,
}

/// Result of one action: `{success, details}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub details: Value,
    #[serde(skip)]
    pub applied: usize,
    #[serde(skip)]
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RetryBatchResult {
    pub attempted: usize,
    pub resolved: usize,
    pub failed: usize,
}

fn target_list(params: &Value, key: &str) -> ServiceResult<Vec<String>> {
    let items = params
        .get(key)
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ServiceError::invalid(format!("params.{} must be a non-empty array", key)))?;
    items
        .iter()
        .map(|item| match item.as_str() {
            Some(name) if name.starts_with("customers/") && !name.contains('\'') => Ok(name.to_string()),
            _ => Err(ServiceError::invalid(format!(
                "params.{} must hold resource names like customers/<id>/...",
                key
            ))),
        })
        .collect()
}

/// Micros as a JSON number or numeric string, strictly positive
fn positive_micros(params: &Value, key: &str) -> ServiceResult<i64> {
    let value = params.get(key);
    let micros = value
        .and_then(Value::as_i64)
        .or_else(|| value.and_then(Value::as_str).and_then(|s| s.trim().parse().ok()));
    match micros {
        Some(m) if m > 0 => Ok(m),
        _ => Err(ServiceError::invalid(format!("params.{} must be a positive integer", key))),
    }
}

/// `params.customerId` when given, else the customer shared by every target
fn customer_for(params: &Value, targets: &[String]) -> ServiceResult<String> {
    if let Some(raw) = params.get("customerId").and_then(Value::as_str) {
        return normalize_customer_id(raw)
            .ok_or_else(|| ServiceError::invalid("params.customerId must be a 10-digit customer id"));
    }
    let first = targets
        .first()
        .and_then(|t| customer_of(t))
        .ok_or_else(|| ServiceError::invalid("cannot derive the customer id from the targets"))?;
    if targets.iter().any(|t| customer_of(t) != Some(first)) {
        return Err(ServiceError::invalid("all targets of an action must belong to one customer"));
    }
    Ok(first.to_string())
}

fn explicit_suffix(params: &Value) -> Option<String> {
    params
        .get("finalUrlSuffix")
        .and_then(Value::as_str)
        .map(|s| s.trim().trim_start_matches('?'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn offer_link(params: &Value) -> Option<&str> {
    params
        .get("url")
        .or_else(|| params.pointer("/links/0"))
        .or_else(|| params.get("target"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn filter_names(filter: &Map<String, Value>, key: &str) -> ServiceResult<Option<Vec<String>>> {
    match filter.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ServiceError::invalid(format!("filter.{} must hold strings", key)))
            })
            .collect::<ServiceResult<Vec<_>>>()
            .map(Some),
        Some(_) => Err(ServiceError::invalid(format!("filter.{} must be an array", key))),
    }
}

/// Narrow targets to `filter.resourceNames`, then drop `filter.excludeResourceNames`
fn apply_filter(filter: Option<&Value>, targets: Vec<String>) -> ServiceResult<Vec<String>> {
    let filter = match filter {
        None | Some(Value::Null) => return Ok(targets),
        Some(Value::Object(filter)) => filter,
        Some(_) => return Err(ServiceError::invalid("filter must be an object")),
    };
    if let Some(key) = filter
        .keys()
        .find(|k| !matches!(k.as_str(), "resourceNames" | "excludeResourceNames"))
    {
        return Err(ServiceError::invalid(format!("unsupported filter key: {}", key)));
    }

    let keep = filter_names(filter, "resourceNames")?;
    let exclude = filter_names(filter, "excludeResourceNames")?.unwrap_or_default();
    let targets: Vec<String> = targets
        .into_iter()
        .filter(|t| keep.as_ref().map_or(true, |keep| keep.contains(t)))
        .filter(|t| !exclude.contains(t))
        .collect();
    if targets.is_empty() {
        return Err(ServiceError::invalid("filter excludes every target"));
    }
    Ok(targets)
}

/// Targets an action mutates, after its filter
fn action_targets(action: &BulkAction) -> ServiceResult<Vec<String>> {
    let key = match action.action_type {
        ActionType::AdjustCpc => "targetResourceNames",
        ActionType::AdjustBudget => "campaignBudgetResourceNames",
        ActionType::RotateLink => "adResourceNames",
    };
    apply_filter(action.filter.as_ref(), target_list(&action.params, key)?)
}

/// Check an action's params without side effects
pub fn validate(action: &BulkAction) -> ServiceResult<()> {
    let params = &action.params;
    match action.action_type {
        ActionType::AdjustCpc => {
            positive_micros(params, "cpcMicros")?;
        }
        ActionType::AdjustBudget => {
            positive_micros(params, "amountMicros")?;
        }
        ActionType::RotateLink => {
            if params.get("finalUrlSuffix").is_some_and(|s| !s.is_string()) {
                return Err(ServiceError::invalid("params.finalUrlSuffix must be a string"));
            }
        }
    }
    let targets = action_targets(action)?;
    customer_for(params, &targets).map(|_| ())
}

fn build(action: &BulkAction, suffix: Option<String>) -> ServiceResult<PlannedAction> {
    let params = &action.params;
    let mut details = Map::new();
    let (targets, operations) = match action.action_type {
        ActionType::AdjustCpc => {
            let micros = positive_micros(params, "cpcMicros")?;
            let targets = action_targets(action)?;
            let ops = targets
                .iter()
                .map(|name| {
                    json!({ "adGroupCriterionOperation": {
                        "update": { "resourceName": name, "cpcBidMicros": micros.to_string() },
                        "updateMask": "cpc_bid_micros",
                    }})
                })
                .collect();
            details.insert("cpcMicros".into(), json!(micros));
            (targets, ops)
        }
        ActionType::AdjustBudget => {
            let micros = positive_micros(params, "amountMicros")?;
            let targets = action_targets(action)?;
            let ops = targets
                .iter()
                .map(|name| {
                    json!({ "campaignBudgetOperation": {
                        "update": { "resourceName": name, "amountMicros": micros.to_string() },
                        "updateMask": "amount_micros",
                    }})
                })
                .collect();
            details.insert("amountMicros".into(), json!(micros));
            (targets, ops)
        }
        ActionType::RotateLink => {
            let suffix = suffix.ok_or_else(|| ServiceError::invalid("no final URL suffix resolved"))?;
            let targets = action_targets(action)?;
            let ops = targets
                .iter()
                .map(|name| {
                    json!({ "adGroupAdOperation": {
                        "update": { "resourceName": name, "ad": { "finalUrlSuffix": suffix } },
                        "updateMask": "ad.final_url_suffix",
                    }})
                })
                .collect();
            details.insert("suffix".into(), json!(suffix));
            (targets, ops)
        }
    };
    let customer_id = customer_for(params, &targets)?;
    details.insert("targets".into(), json!(targets));
    Ok(PlannedAction {
        action_type: action.action_type,
        customer_id,
        targets,
        operations,
        details,
    })
}

/// GAQL reading the mutated field of every target
fn snapshot_query(action_type: ActionType, targets: &[String]) -> String {
    let (entity, field) = match action_type {
        ActionType::AdjustCpc => ("ad_group_criterion", "ad_group_criterion.cpc_bid_micros"),
        ActionType::AdjustBudget => ("campaign_budget", "campaign_budget.amount_micros"),
        ActionType::RotateLink => ("ad_group_ad", "ad_group_ad.ad.final_url_suffix"),
    };
    let names = targets
        .iter()
        .map(|t| format!("'{}'", t))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT {entity}.resource_name, {field} FROM {entity} WHERE {entity}.resource_name IN ({names})"
    )
}

/// searchStream rows keyed by the entity's resource name
fn rows_by_resource(action_type: ActionType, rows: Vec<Value>) -> Value {
    let entity = match action_type {
        ActionType::AdjustCpc => "adGroupCriterion",
        ActionType::AdjustBudget => "campaignBudget",
        ActionType::RotateLink => "adGroupAd",
    };
    let mut map = Map::new();
    for row in rows {
        if let Some(name) = row
            .get(entity)
            .and_then(|e| e.get("resourceName"))
            .and_then(Value::as_str)
        {
            map.insert(name.to_string(), row.clone());
        }
    }
    Value::Object(map)
}

fn task_data(
    operation: &BulkOperation,
    status: Option<BulkStatus>,
    summary: Option<Value>,
    error: Option<String>,
) -> BatchOpsTaskData {
    let mut extra = Map::new();
    extra.insert("validateOnly".into(), json!(operation.validate_only));
    extra.insert("actionCount".into(), json!(operation.actions.len()));
    BatchOpsTaskData {
        operation_id: operation.id.to_string(),
        user_id: operation.user_id.clone(),
        status: status.map(|s| s.to_string()),
        summary,
        error,
        extra,
    }
}

pub struct Executor {
    ads: Arc<dyn AdsApi>,
    store: Arc<dyn BulkActionStore>,
    recorder: EventRecorder,
    browser: Option<Arc<BrowserResolver>>,
    live_mutate: bool,
}

impl Executor {
    pub fn new(
        ads: Arc<dyn AdsApi>,
        store: Arc<dyn BulkActionStore>,
        recorder: EventRecorder,
        live_mutate: bool,
    ) -> Self {
        Self {
            ads,
            store,
            recorder,
            browser: None,
            live_mutate,
        }
    }

    pub fn with_browser(mut self, browser: Arc<BrowserResolver>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Validate-only unless live mutation is enabled and not declined
    pub fn effective_validate_only(&self, requested: Option<bool>) -> bool {
        requested.unwrap_or(false) || !self.live_mutate
    }

    async fn emit(&self, envelope: Envelope, idempotency_key: Option<&str>) {
        if let Err(e) = self.recorder.record(&envelope, idempotency_key).await {
            tracing::error!(event_type = %envelope.event_type, "Failed to record event: {}", e);
        }
    }

    /// Suffix from params, else from the browser executor, else a timestamp
    async fn resolve_suffix(&self, params: &Value) -> String {
        if let Some(suffix) = explicit_suffix(params) {
            return suffix;
        }
        if let (Some(browser), Some(link)) = (&self.browser, offer_link(params)) {
            let timeout = params
                .get("timeoutMs")
                .and_then(Value::as_u64)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RESOLVE_TIMEOUT);
            match browser.resolve_suffix(link, timeout).await {
                Ok(Some(suffix)) => return suffix,
                Ok(None) => tracing::debug!("Browser executor returned no suffix"),
                Err(e) => tracing::warn!("Failed to resolve final URL suffix: {}", e),
            }
        }
        format!("ts={}", Utc::now().format("%Y%m%d%H%M%S"))
    }

    pub async fn plan(&self, action: &BulkAction) -> ServiceResult<PlannedAction> {
        let suffix = match action.action_type {
            ActionType::RotateLink => Some(self.resolve_suffix(&action.params).await),
            _ => None,
        };
        build(action, suffix)
    }

    async fn snapshot(
        &self,
        session: &AdsSession,
        operation_id: Uuid,
        index: usize,
        phase: SnapshotPhase,
        planned: &PlannedAction,
    ) -> ServiceResult<Value> {
        let query = snapshot_query(planned.action_type, &planned.targets);
        let data = match self.ads.search_stream(session, &planned.customer_id, &query).await {
            Ok(rows) => rows_by_resource(planned.action_type, rows),
            Err(e) => {
                tracing::warn!(%operation_id, index, phase = phase.as_str(), "Snapshot read failed: {}", e);
                Value::Object(Map::new())
            }
        };
        self.store
            .add_snapshot(&Snapshot {
                id: Uuid::now_v7(),
                operation_id,
                action_index: index as i32,
                phase,
                data: data.clone(),
                created_at: Utc::now(),
            })
            .await?;
        Ok(data)
    }

    async fn dead_letter(
        &self,
        operation_id: Uuid,
        index: usize,
        planned: &PlannedAction,
        operation: &Value,
        error: &AdsError,
    ) -> ServiceResult<()> {
        let now = Utc::now();
        self.store
            .add_dead_letter(&DeadLetter {
                id: Uuid::now_v7(),
                operation_id,
                action_index: index as i32,
                action_type: planned.action_type,
                customer_id: planned.customer_id.clone(),
                operation: operation.clone(),
                error: error.to_string(),
                retry_count: 0,
                status: DeadLetterStatus::Pending,
                created_at: now,
                updated_at: now,
            })
            .await?;
        Ok(())
    }

    /// Mutate in batches; returns (applied, dead-lettered)
    async fn apply(
        &self,
        session: &AdsSession,
        operation_id: Uuid,
        index: usize,
        planned: &PlannedAction,
    ) -> ServiceResult<(usize, usize)> {
        let mut applied = 0;
        let mut failed = 0;

        for batch in planned.operations.chunks(BATCH_SIZE) {
            let error = match self.ads.mutate(session, &planned.customer_id, batch, false).await {
                Ok(_) => {
                    applied += batch.len();
                    continue;
                }
                Err(e @ (AdsError::NotConnected | AdsError::MissingCredentials(_))) => return Err(e.into()),
                Err(e) => e,
            };

            if batch.len() == 1 {
                self.dead_letter(operation_id, index, planned, &batch[0], &error).await?;
                failed += 1;
                continue;
            }

            tracing::warn!(
                %operation_id,
                index,
                batch_size = batch.len(),
                "Batch mutate failed, retrying operations one by one: {}",
                error
            );
            for operation in batch {
                match self
                    .ads
                    .mutate(session, &planned.customer_id, slice::from_ref(operation), false)
                    .await
                {
                    Ok(_) => applied += 1,
                    Err(e) => {
                        self.dead_letter(operation_id, index, planned, operation, &e).await?;
                        failed += 1;
                    }
                }
            }
        }
        Ok((applied, failed))
    }

    /// Plan and run one action
    pub async fn execute_action(
        &self,
        session: &AdsSession,
        operation_id: Uuid,
        index: usize,
        action: &BulkAction,
        validate_only: bool,
    ) -> ServiceResult<ActionOutcome> {
        let planned = self.plan(action).await?;
        let mut details = planned.details.clone();

        if validate_only {
            self.ads
                .mutate(session, &planned.customer_id, &planned.operations, true)
                .await?;
            return Ok(ActionOutcome {
                success: true,
                details: Value::Object(details),
                applied: planned.operations.len(),
                failed: 0,
            });
        }

        let before = self
            .snapshot(session, operation_id, index, SnapshotPhase::Before, &planned)
            .await?;
        let (applied, failed) = self.apply(session, operation_id, index, &planned).await?;
        let after = self
            .snapshot(session, operation_id, index, SnapshotPhase::After, &planned)
            .await?;

        details.insert("applied".into(), json!(applied));
        details.insert("failed".into(), json!(failed));
        details.insert("before".into(), before);
        details.insert("after".into(), after);
        Ok(ActionOutcome {
            success: failed == 0,
            details: Value::Object(details),
            applied,
            failed,
        })
    }

    /// Execute every action of a stored operation and record the outcome
    #[tracing::instrument(skip(self, operation, session), fields(operation_id = %operation.id))]
    pub async fn run(&self, operation: &BulkOperation, session: &AdsSession) -> ServiceResult<BulkStatus> {
        self.store
            .update_operation_status(operation.id, BulkStatus::Running, None)
            .await?;
        self.emit(
            Envelope::new(
                SOURCE,
                EventData::BatchOpsTaskStarted(task_data(operation, Some(BulkStatus::Running), None, None)),
            )
            .with_subject(operation.id.to_string()),
            None,
        )
        .await;

        let total = operation.actions.len();
        let (mut succeeded, mut partial, mut failed) = (0usize, 0usize, 0usize);
        let mut results = Vec::with_capacity(total);

        for (index, action) in operation.actions.iter().enumerate() {
            let mut entry = Map::new();
            entry.insert("index".into(), json!(index));
            entry.insert("type".into(), json!(action.action_type));
            match self
                .execute_action(session, operation.id, index, action, operation.validate_only)
                .await
            {
                Ok(outcome) => {
                    if outcome.failed == 0 {
                        succeeded += 1;
                    } else if outcome.applied == 0 {
                        failed += 1;
                    } else {
                        partial += 1;
                    }
                    entry.insert("success".into(), json!(outcome.success));
                    entry.insert("details".into(), outcome.details);
                }
                Err(e) => {
                    tracing::warn!(index, action_type = %action.action_type, "Action failed: {}", e);
                    failed += 1;
                    entry.insert("success".into(), json!(false));
                    entry.insert("error".into(), json!(e.to_string()));
                }
            }
            results.push(Value::Object(entry));
        }

        let status = if succeeded == total {
            BulkStatus::Completed
        } else if failed == total {
            BulkStatus::Failed
        } else {
            BulkStatus::Partial
        };
        let summary = json!({
            "total": total,
            "succeeded": succeeded,
            "partial": partial,
            "failed": failed,
            "validateOnly": operation.validate_only,
            "results": results,
        });

        self.store
            .update_operation_status(operation.id, status, Some(summary.clone()))
            .await?;

        let data = task_data(operation, Some(status), Some(summary), None);
        let event = if status == BulkStatus::Failed {
            EventData::BatchOpsTaskFailed(BatchOpsTaskData {
                error: Some("all actions failed".into()),
                ..data
            })
        } else {
            EventData::BatchOpsTaskCompleted(data)
        };
        self.emit(Envelope::new(SOURCE, event).with_subject(operation.id.to_string()), None)
            .await;

        tracing::info!(status = %status, succeeded, partial, failed, "Bulk operation finished");
        Ok(status)
    }

    async fn mark_failed(&self, operation: &BulkOperation, reason: &str) {
        tracing::error!(operation_id = %operation.id, "Bulk operation failed: {}", reason);
        if let Err(e) = self
            .store
            .update_operation_status(operation.id, BulkStatus::Failed, Some(json!({ "error": reason })))
            .await
        {
            tracing::error!(operation_id = %operation.id, "Failed to mark operation failed: {}", e);
        }
        self.emit(
            Envelope::new(
                SOURCE,
                EventData::BatchOpsTaskFailed(task_data(
                    operation,
                    Some(BulkStatus::Failed),
                    None,
                    Some(reason.to_string()),
                )),
            )
            .with_subject(operation.id.to_string()),
            None,
        )
        .await;
    }

    /// Validate, store and queue an operation; execution continues in the background
    pub async fn submit(
        self: &Arc<Self>,
        user_id: &str,
        actions: Vec<BulkAction>,
        validate_only: Option<bool>,
        session: AdsSession,
        idempotency_key: Option<&str>,
    ) -> ServiceResult<BulkOperation> {
        if actions.is_empty() {
            return Err(ServiceError::invalid("actions must not be empty"));
        }
        for (index, action) in actions.iter().enumerate() {
            validate(action).map_err(|e| ServiceError::invalid(format!("actions[{}]: {}", index, e)))?;
        }

        let operation = BulkOperation::new(user_id, actions, self.effective_validate_only(validate_only));
        self.store.create_operation(&operation).await?;
        self.recorder
            .record(
                &Envelope::new(
                    SOURCE,
                    EventData::BatchOpsTaskQueued(task_data(&operation, Some(BulkStatus::Queued), None, None)),
                )
                .with_subject(operation.id.to_string()),
                idempotency_key,
            )
            .await?;

        self.spawn(operation.clone(), session);
        Ok(operation)
    }

    fn spawn(self: &Arc<Self>, operation: BulkOperation, session: AdsSession) {
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = catch_panic(async {
                executor
                    .run(&operation, &session)
                    .await
                    .map_err(anyhow::Error::from)
            })
            .await;
            if let Err(e) = outcome {
                executor.mark_failed(&operation, &e.to_string()).await;
            }
        });
    }

    /// Operation owned by `user_id`; other users' operations are not found
    pub async fn get_owned(&self, operation_id: Uuid, user_id: &str) -> ServiceResult<BulkOperation> {
        self.store
            .get_operation(operation_id)
            .await?
            .filter(|op| op.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Bulk operation {} not found", operation_id)))
    }

    pub async fn snapshots(&self, operation_id: Uuid) -> ServiceResult<Vec<Snapshot>> {
        Ok(self.store.list_snapshots(operation_id).await?)
    }

    pub async fn dead_letters(&self, operation_id: Uuid) -> ServiceResult<Vec<DeadLetter>> {
        Ok(self.store.list_dead_letters(operation_id).await?)
    }

    /// Replay the stored operation; true when it went through
    async fn replay(&self, session: &AdsSession, dead_letter: &DeadLetter) -> ServiceResult<bool> {
        if !self.live_mutate {
            return Err(ServiceError::NotConfigured(
                "Live mutations are disabled (ADS_LIVE_MUTATE)".into(),
            ));
        }
        let result = self
            .ads
            .mutate(
                session,
                &dead_letter.customer_id,
                slice::from_ref(&dead_letter.operation),
                false,
            )
            .await;
        match result {
            Ok(_) => {
                self.store
                    .record_dead_letter_retry(dead_letter.id, DeadLetterStatus::Resolved, None)
                    .await?;
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(dead_letter_id = %dead_letter.id, "Dead letter retry failed: {}", e);
                self.store
                    .record_dead_letter_retry(dead_letter.id, DeadLetterStatus::Pending, Some(&e.to_string()))
                    .await?;
                Ok(false)
            }
        }
    }

    pub async fn retry_dead_letter(
        &self,
        session: &AdsSession,
        operation_id: Uuid,
        dead_letter_id: Uuid,
    ) -> ServiceResult<DeadLetter> {
        let not_found = || ServiceError::NotFound(format!("Dead letter {} not found", dead_letter_id));
        let dead_letter = self
            .store
            .get_dead_letter(operation_id, dead_letter_id)
            .await?
            .ok_or_else(not_found)?;
        if dead_letter.status == DeadLetterStatus::Resolved {
            return Ok(dead_letter);
        }
        self.replay(session, &dead_letter).await?;
        self.store
            .get_dead_letter(operation_id, dead_letter_id)
            .await?
            .ok_or_else(not_found)
    }

    /// Replay every pending dead letter, optionally of one action type
    pub async fn retry_batch(
        &self,
        session: &AdsSession,
        operation_id: Uuid,
        action_type: Option<ActionType>,
    ) -> ServiceResult<RetryBatchResult> {
        let pending: Vec<DeadLetter> = self
            .store
            .list_dead_letters(operation_id)
            .await?
            .into_iter()
            .filter(|dl| dl.status == DeadLetterStatus::Pending)
            .filter(|dl| action_type.is_none_or(|t| dl.action_type == t))
            .collect();

        let mut result = RetryBatchResult::default();
        for dead_letter in &pending {
            result.attempted += 1;
            if self.replay(session, dead_letter).await? {
                result.resolved += 1;
            } else {
                result.failed += 1;
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ads::{AdsResult, StubAdsClient};
    use async_trait::async_trait;
    use autoads_core::memory::{InMemoryBus, InMemoryStore};
    use parking_lot::Mutex;

    fn action(value: Value) -> BulkAction {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_validate_rejects_bad_params() {
        assert!(validate(&action(json!({
            "type": "ADJUST_CPC",
            "params": { "targetResourceNames": ["customers/1234567890/adGroupCriteria/1~2"], "cpcMicros": 0 }
        })))
        .is_err());
        assert!(validate(&action(json!({
            "type": "ADJUST_BUDGET",
            "params": { "campaignBudgetResourceNames": [], "amountMicros": 1000000 }
        })))
        .is_err());
        assert!(validate(&action(json!({
            "type": "ROTATE_LINK",
            "params": { "adResourceNames": ["customers/1/adGroupAds/1", "customers/2/adGroupAds/1"] }
        })))
        .is_err());
        assert!(validate(&action(json!({
            "type": "ADJUST_CPC",
            "params": { "targetResourceNames": ["customers/1234567890/adGroupCriteria/1~2"], "cpcMicros": "250000", "customerId": "12345" }
        })))
        .is_err());
        assert!(validate(&action(json!({
            "type": "ADJUST_CPC",
            "params": { "targetResourceNames": ["customers/1234567890/adGroupCriteria/1~2"], "cpcMicros": "250000" }
        })))
        .is_ok());
    }

    #[test]
    fn test_build_operations_and_masks() {
        let planned = build(
            &action(json!({
                "type": "ADJUST_BUDGET",
                "params": { "campaignBudgetResourceNames": ["customers/1234567890/campaignBudgets/7"], "amountMicros": 5000000 }
            })),
            None,
        )
        .unwrap();
        assert_eq!(planned.customer_id, "1234567890");
        assert_eq!(
            planned.operations[0],
            json!({ "campaignBudgetOperation": {
                "update": { "resourceName": "customers/1234567890/campaignBudgets/7", "amountMicros": "5000000" },
                "updateMask": "amount_micros"
            }})
        );

        let planned = build(
            &action(json!({
                "type": "ROTATE_LINK",
                "params": { "adResourceNames": ["customers/1/adGroupAds/1"] }
            })),
            Some("utm_source=x".into()),
        )
        .unwrap();
        assert_eq!(planned.operations[0]["adGroupAdOperation"]["updateMask"], "ad.final_url_suffix");
        assert_eq!(
            planned.operations[0]["adGroupAdOperation"]["update"]["ad"]["finalUrlSuffix"],
            "utm_source=x"
        );
    }

    #[test]
    fn test_filter_narrows_targets() {
        let planned = build(
            &action(json!({
                "type": "ADJUST_CPC",
                "params": {
                    "targetResourceNames": [
                        "customers/1234567890/adGroupCriteria/1~2",
                        "customers/1234567890/adGroupCriteria/1~3",
                        "customers/1234567890/adGroupCriteria/1~4"
                    ],
                    "cpcMicros": 250000
                },
                "filter": { "excludeResourceNames": ["customers/1234567890/adGroupCriteria/1~3"] }
            })),
            None,
        )
        .unwrap();
        assert_eq!(
            planned.targets,
            vec!["customers/1234567890/adGroupCriteria/1~2", "customers/1234567890/adGroupCriteria/1~4"]
        );
        assert_eq!(planned.operations.len(), 2);

        // Keeping one customer's targets makes a mixed list valid
        let mixed = action(json!({
            "type": "ROTATE_LINK",
            "params": { "adResourceNames": ["customers/1/adGroupAds/1", "customers/2/adGroupAds/1"] },
            "filter": { "resourceNames": ["customers/2/adGroupAds/1"] }
        }));
        assert!(validate(&mixed).is_ok());
        let planned = build(&mixed, Some("s=1".into())).unwrap();
        assert_eq!(planned.customer_id, "2");
        assert_eq!(planned.targets, vec!["customers/2/adGroupAds/1"]);
    }

    #[test]
    fn test_filter_rejects_bad_shapes() {
        let with_filter = |filter: Value| {
            action(json!({
                "type": "ADJUST_BUDGET",
                "params": { "campaignBudgetResourceNames": ["customers/1234567890/campaignBudgets/7"], "amountMicros": 1 },
                "filter": filter
            }))
        };
        assert!(validate(&with_filter(Value::Null)).is_ok());
        assert!(validate(&with_filter(json!("all"))).is_err());
        assert!(validate(&with_filter(json!({ "campaignStatus": "ENABLED" }))).is_err());
        assert!(validate(&with_filter(json!({ "resourceNames": "customers/1234567890/campaignBudgets/7" }))).is_err());
        assert!(validate(&with_filter(json!({ "resourceNames": [7] }))).is_err());
        assert!(validate(&with_filter(json!({ "resourceNames": ["customers/1234567890/campaignBudgets/8"] }))).is_err());
    }

    #[test]
    fn test_snapshot_query() {
        let query = snapshot_query(
            ActionType::AdjustCpc,
            &["customers/1/adGroupCriteria/1~2".to_string(), "customers/1/adGroupCriteria/1~3".to_string()],
        );
        assert_eq!(
            query,
            "SELECT ad_group_criterion.resource_name, ad_group_criterion.cpc_bid_micros \
             FROM ad_group_criterion WHERE ad_group_criterion.resource_name IN \
             ('customers/1/adGroupCriteria/1~2', 'customers/1/adGroupCriteria/1~3')"
        );
    }

    /// Live client that rejects any mutate containing a poisoned resource name
    #[derive(Default)]
    struct PickyAds {
        poisoned: Vec<String>,
        mutate_calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl AdsApi for PickyAds {
        fn is_live(&self) -> bool {
            true
        }

        async fn list_accessible_customers(&self, _: &AdsSession) -> AdsResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn search_stream(&self, _: &AdsSession, _: &str, _: &str) -> AdsResult<Vec<Value>> {
            Ok(vec![json!({ "campaignBudget": {
                "resourceName": "customers/1234567890/campaignBudgets/1",
                "amountMicros": "1000000"
            }})])
        }

        async fn mutate(&self, _: &AdsSession, _: &str, ops: &[Value], _: bool) -> AdsResult<Value> {
            self.mutate_calls.lock().push(ops.len());
            let rendered = serde_json::to_string(ops).unwrap_or_default();
            if self.poisoned.iter().any(|p| rendered.contains(p.as_str())) {
                return Err(AdsError::Http {
                    status: 400,
                    message: "INVALID_ARGUMENT".into(),
                });
            }
            Ok(json!({ "mutateOperationResponses": [] }))
        }

        async fn mutate_manager_links(&self, _: &AdsSession, _: &str, _: &[Value]) -> AdsResult<Value> {
            Ok(Value::Null)
        }
    }

    fn executor(ads: Arc<dyn AdsApi>, store: Arc<InMemoryStore>, live: bool) -> Arc<Executor> {
        let recorder = EventRecorder::new(store.clone(), Arc::new(InMemoryBus::new()));
        Arc::new(Executor::new(ads, store, recorder, live))
    }

    fn budget_action(count: usize) -> BulkAction {
        let names: Vec<String> = (1..=count)
            .map(|i| format!("customers/1234567890/campaignBudgets/{}", i))
            .collect();
        action(json!({
            "type": "ADJUST_BUDGET",
            "params": { "campaignBudgetResourceNames": names, "amountMicros": 2000000 }
        }))
    }

    #[tokio::test]
    async fn test_validate_only_skips_snapshots() {
        let store = Arc::new(InMemoryStore::new());
        let ads = Arc::new(StubAdsClient::new());
        let executor = executor(ads.clone(), store.clone(), false);

        let outcome = executor
            .execute_action(&AdsSession::default(), Uuid::now_v7(), 0, &budget_action(2), true)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.details["amountMicros"], 2000000);

        let mutations = ads.mutations();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].1.len(), 2);
        assert!(mutations[0].2);
    }

    #[tokio::test]
    async fn test_live_batches_degrade_to_dead_letters() {
        let store = Arc::new(InMemoryStore::new());
        let ads = Arc::new(PickyAds {
            poisoned: vec!["campaignBudgets/150\"".into()],
            ..Default::default()
        });
        let executor = executor(ads.clone(), store.clone(), true);
        let operation_id = Uuid::now_v7();

        let outcome = executor
            .execute_action(&AdsSession::default(), operation_id, 0, &budget_action(250), false)
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!((outcome.applied, outcome.failed), (249, 1));
        // Batches of 100, 100, 50; the middle one replays item by item
        let calls = ads.mutate_calls.lock().clone();
        assert_eq!(&calls[..3], &[100, 100, 1]);
        assert_eq!(calls.len(), 2 + 100 + 1);

        let dead = store.list_dead_letters(operation_id).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].customer_id, "1234567890");
        assert_eq!(
            dead[0].operation["campaignBudgetOperation"]["update"]["resourceName"],
            "customers/1234567890/campaignBudgets/150"
        );

        let snapshots = store.list_snapshots(operation_id).await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots[0].data.get("customers/1234567890/campaignBudgets/1").is_some());
    }

    #[tokio::test]
    async fn test_dead_letter_retry_resolves() {
        let store = Arc::new(InMemoryStore::new());
        let failing = Arc::new(PickyAds {
            poisoned: vec!["campaignBudgets/1\"".into()],
            ..Default::default()
        });
        let operation_id = Uuid::now_v7();
        executor(failing, store.clone(), true)
            .execute_action(&AdsSession::default(), operation_id, 0, &budget_action(1), false)
            .await
            .unwrap();
        let dead = store.list_dead_letters(operation_id).await.unwrap();
        assert_eq!(dead.len(), 1);

        let healthy = executor(Arc::new(PickyAds::default()), store.clone(), true);
        let retried = healthy
            .retry_dead_letter(&AdsSession::default(), operation_id, dead[0].id)
            .await
            .unwrap();
        assert_eq!(retried.status, DeadLetterStatus::Resolved);
        assert_eq!(retried.retry_count, 1);

        // Nothing pending is left for a batch retry
        let batch = healthy
            .retry_batch(&AdsSession::default(), operation_id, Some(ActionType::AdjustBudget))
            .await
            .unwrap();
        assert_eq!(batch, RetryBatchResult::default());
    }

    #[tokio::test]
    async fn test_unknown_dead_letter_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let executor = executor(Arc::new(PickyAds::default()), store, true);
        let result = executor
            .retry_dead_letter(&AdsSession::default(), Uuid::now_v7(), Uuid::now_v7())
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_run_records_status_and_events() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let recorder = EventRecorder::new(store.clone(), bus.clone());
        let executor = Executor::new(Arc::new(StubAdsClient::new()), store.clone(), recorder, false);

        let mut operation = BulkOperation::new(
            "u1",
            vec![
                budget_action(1),
                action(json!({ "type": "ADJUST_CPC", "params": { "targetResourceNames": ["campaigns/1"], "cpcMicros": 1 } })),
            ],
            true,
        );
        operation.status = BulkStatus::Queued;
        store.create_operation(&operation).await.unwrap();

        let status = executor.run(&operation, &AdsSession::default()).await.unwrap();
        assert_eq!(status, BulkStatus::Partial);

        let stored = store.get_operation(operation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BulkStatus::Partial);
        let summary = stored.summary.unwrap();
        assert_eq!(summary["succeeded"], 1);
        assert_eq!(summary["failed"], 1);
        assert_eq!(summary["results"][1]["success"], false);

        let types: Vec<String> = bus.published().into_iter().map(|(e, _)| e.event_type).collect();
        assert_eq!(types, vec!["BatchOpsTaskStarted", "BatchOpsTaskCompleted"]);
    }
}
