// In-memory implementations for tests and local development
// Decision: Use parking_lot for thread-safe access; no lock is held across an await
// Decision: One InMemoryStore implements every store trait, like a single database
//
// Data is lost on restart. Services fall back to these when DATABASE_URL is unset.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ads::{
    BulkOperation, BulkStatus, DeadLetter, DeadLetterStatus, Snapshot, UserAdsConnection,
};
use crate::brand::{BrandProfile, CoverageResult, KeywordRisk};
use crate::console::{
    ConfigEntry, ConsoleStats, Role, Subscription, TokenBalance, TokenStats, UserRecord,
    SUBSCRIPTION_PERIOD_DAYS,
};
use crate::error::{BusError, SecretError, StoreError, UpstreamError};
use crate::events::Envelope;
use crate::idempotency::IdempotencyBinding;
use crate::notification::{DailyIncidents, NewNotification, Notification, Severity};
use crate::offer::Offer;
use crate::records::{EventFilter, EventProjection, EventRecord};
use crate::siterank::{Analysis, AnalysisStatus, DomainCacheEntry};
use crate::traits::*;

type BindingKey = (String, String, String);

struct LedgerEntry {
    user_id: String,
    created_at: DateTime<Utc>,
}

/// In-memory database
#[derive(Default)]
pub struct InMemoryStore {
    events: RwLock<Vec<EventRecord>>,
    projections: RwLock<HashMap<String, EventProjection>>,
    bindings: RwLock<HashMap<BindingKey, IdempotencyBinding>>,
    connections: RwLock<BTreeMap<String, UserAdsConnection>>,
    operations: RwLock<HashMap<Uuid, BulkOperation>>,
    snapshots: RwLock<Vec<Snapshot>>,
    dead_letters: RwLock<Vec<DeadLetter>>,
    offers: RwLock<HashMap<String, Offer>>,
    analyses: RwLock<Vec<Analysis>>,
    domains: RwLock<HashMap<String, DomainCacheEntry>>,
    profiles: RwLock<HashMap<String, BrandProfile>>,
    keyword_results: RwLock<Vec<(String, KeywordRisk)>>,
    coverage: RwLock<HashMap<(String, String), CoverageResult>>,
    notifications: RwLock<Vec<Notification>>,
    next_notification_id: AtomicI64,
    users: RwLock<BTreeMap<String, UserRecord>>,
    balances: RwLock<HashMap<String, TokenBalance>>,
    ledger: RwLock<Vec<LedgerEntry>>,
    subscriptions: RwLock<HashMap<String, Subscription>>,
    config: RwLock<HashMap<String, ConfigEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user row
    pub fn insert_user(&self, user: UserRecord) {
        self.users.write().insert(user.id.clone(), user);
    }

    /// Keyword results written for a seed domain
    pub fn keyword_results(&self, seed_domain: &str) -> Vec<KeywordRisk> {
        self.keyword_results
            .read()
            .iter()
            .filter(|(seed, _)| seed == seed_domain)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Number of projected events
    pub fn projection_count(&self) -> usize {
        self.projections.read().len()
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn append(&self, record: &EventRecord) -> StoreResult<()> {
        let mut events = self.events.write();
        if events.iter().any(|e| e.id == record.id) {
            return Err(StoreError::AlreadyExists(format!("event {}", record.id)));
        }
        events.push(record.clone());
        Ok(())
    }

    async fn query(&self, filter: &EventFilter) -> StoreResult<Vec<EventRecord>> {
        let events = self.events.read();
        let mut rows: Vec<EventRecord> = events.iter().filter(|e| filter.matches(e)).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        rows.truncate(filter.limit.max(0) as usize);
        Ok(rows)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<EventRecord>> {
        Ok(self.events.read().iter().find(|e| e.id == id).cloned())
    }
}

#[async_trait]
impl ProjectionStore for InMemoryStore {
    async fn insert_if_absent(&self, projection: &EventProjection) -> StoreResult<bool> {
        let mut projections = self.projections.write();
        if projections.contains_key(&projection.event_id) {
            return Ok(false);
        }
        projections.insert(projection.event_id.clone(), projection.clone());
        Ok(true)
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryStore {
    async fn lookup(&self, key: &str, user_id: &str, scope: &str) -> StoreResult<Option<String>> {
        let now = Utc::now();
        Ok(self
            .bindings
            .read()
            .get(&(key.to_string(), user_id.to_string(), scope.to_string()))
            .filter(|b| !b.is_expired(now))
            .map(|b| b.target_id.clone()))
    }

    async fn bind(&self, binding: &IdempotencyBinding) -> StoreResult<()> {
        self.bindings.write().insert(
            (
                binding.key.clone(),
                binding.user_id.clone(),
                binding.scope.clone(),
            ),
            binding.clone(),
        );
        Ok(())
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let now = Utc::now();
        let mut bindings = self.bindings.write();
        let before = bindings.len();
        bindings.retain(|_, b| !b.is_expired(now));
        Ok((before - bindings.len()) as u64)
    }
}

#[async_trait]
impl ConnectionStore for InMemoryStore {
    async fn get_connection(&self, user_id: &str) -> StoreResult<Option<UserAdsConnection>> {
        Ok(self.connections.read().get(user_id).cloned())
    }

    async fn upsert_connection(&self, connection: &UserAdsConnection) -> StoreResult<()> {
        let mut connections = self.connections.write();
        let mut next = connection.clone();
        if let Some(existing) = connections.get(&connection.user_id) {
            next.login_customer_id = next.login_customer_id.or_else(|| existing.login_customer_id.clone());
            next.primary_customer_id = next
                .primary_customer_id
                .or_else(|| existing.primary_customer_id.clone());
        }
        connections.insert(connection.user_id.clone(), next);
        Ok(())
    }

    async fn update_refresh_token(&self, user_id: &str, refresh_token: &str) -> StoreResult<()> {
        let mut connections = self.connections.write();
        let connection = connections
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("connection for {}", user_id)))?;
        connection.refresh_token = refresh_token.to_string();
        connection.updated_at = Utc::now();
        Ok(())
    }

    async fn list_connections(&self, offset: i64, limit: i64) -> StoreResult<Vec<UserAdsConnection>> {
        Ok(self
            .connections
            .read()
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BulkActionStore for InMemoryStore {
    async fn create_operation(&self, operation: &BulkOperation) -> StoreResult<()> {
        let mut operations = self.operations.write();
        if operations.contains_key(&operation.id) {
            return Err(StoreError::AlreadyExists(format!("bulk action {}", operation.id)));
        }
        operations.insert(operation.id, operation.clone());
        Ok(())
    }

    async fn get_operation(&self, id: Uuid) -> StoreResult<Option<BulkOperation>> {
        Ok(self.operations.read().get(&id).cloned())
    }

    async fn update_operation_status(
        &self,
        id: Uuid,
        status: BulkStatus,
        summary: Option<Value>,
    ) -> StoreResult<()> {
        let mut operations = self.operations.write();
        let op = operations
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("bulk action {}", id)))?;
        op.status = status;
        if summary.is_some() {
            op.summary = summary;
        }
        op.updated_at = Utc::now();
        Ok(())
    }

    async fn add_snapshot(&self, snapshot: &Snapshot) -> StoreResult<()> {
        self.snapshots.write().push(snapshot.clone());
        Ok(())
    }

    async fn list_snapshots(&self, operation_id: Uuid) -> StoreResult<Vec<Snapshot>> {
        let mut rows: Vec<Snapshot> = self
            .snapshots
            .read()
            .iter()
            .filter(|s| s.operation_id == operation_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.action_index, s.created_at));
        Ok(rows)
    }

    async fn add_dead_letter(&self, dead_letter: &DeadLetter) -> StoreResult<()> {
        self.dead_letters.write().push(dead_letter.clone());
        Ok(())
    }

    async fn list_dead_letters(&self, operation_id: Uuid) -> StoreResult<Vec<DeadLetter>> {
        Ok(self
            .dead_letters
            .read()
            .iter()
            .filter(|d| d.operation_id == operation_id)
            .cloned()
            .collect())
    }

    async fn get_dead_letter(&self, operation_id: Uuid, id: Uuid) -> StoreResult<Option<DeadLetter>> {
        Ok(self
            .dead_letters
            .read()
            .iter()
            .find(|d| d.operation_id == operation_id && d.id == id)
            .cloned())
    }

    async fn record_dead_letter_retry(
        &self,
        id: Uuid,
        status: DeadLetterStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let mut dead_letters = self.dead_letters.write();
        let dl = dead_letters
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("dead letter {}", id)))?;
        dl.retry_count += 1;
        dl.status = status;
        if let Some(error) = error {
            dl.error = error.to_string();
        }
        dl.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl OfferStore for InMemoryStore {
    async fn create_offer(&self, offer: &Offer) -> StoreResult<()> {
        let mut offers = self.offers.write();
        if offers.contains_key(&offer.id) {
            return Err(StoreError::AlreadyExists(format!("offer {}", offer.id)));
        }
        offers.insert(offer.id.clone(), offer.clone());
        Ok(())
    }

    async fn get_offer(&self, id: &str) -> StoreResult<Option<Offer>> {
        Ok(self.offers.read().get(id).cloned())
    }
}

impl InMemoryStore {
    fn update_analysis<F>(&self, id: Uuid, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Analysis),
    {
        let mut analyses = self.analyses.write();
        let analysis = analyses
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("analysis {}", id)))?;
        apply(analysis);
        analysis.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl AnalysisStore for InMemoryStore {
    async fn create_analysis(&self, analysis: &Analysis) -> StoreResult<()> {
        let mut analyses = self.analyses.write();
        if analyses
            .iter()
            .any(|a| a.user_id == analysis.user_id && a.offer_id == analysis.offer_id && a.status.is_active())
        {
            return Err(StoreError::AlreadyExists(format!(
                "active analysis for offer {}",
                analysis.offer_id
            )));
        }
        analyses.push(analysis.clone());
        Ok(())
    }

    async fn get_analysis(&self, id: Uuid) -> StoreResult<Option<Analysis>> {
        Ok(self.analyses.read().iter().find(|a| a.id == id).cloned())
    }

    async fn latest_for_offer(&self, offer_id: &str, user_id: Option<&str>) -> StoreResult<Option<Analysis>> {
        Ok(self
            .analyses
            .read()
            .iter()
            .filter(|a| a.offer_id == offer_id && user_id.map_or(true, |u| a.user_id == u))
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .cloned())
    }

    async fn mark_running(&self, id: Uuid) -> StoreResult<()> {
        self.update_analysis(id, |a| {
            a.status = AnalysisStatus::Running;
            a.started_at = Some(Utc::now());
        })
    }

    async fn mark_completed(&self, id: Uuid, result: Value) -> StoreResult<()> {
        self.update_analysis(id, |a| {
            a.status = AnalysisStatus::Completed;
            a.result = Some(result);
            a.error = None;
            a.completed_at = Some(Utc::now());
        })
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> StoreResult<()> {
        self.update_analysis(id, |a| {
            a.status = AnalysisStatus::Failed;
            a.error = Some(reason.to_string());
            a.completed_at = Some(Utc::now());
        })
    }
}

#[async_trait]
impl DomainCacheStore for InMemoryStore {
    async fn get_domain(&self, host: &str) -> StoreResult<Option<DomainCacheEntry>> {
        Ok(self.domains.read().get(host).cloned())
    }

    async fn put_domain(&self, entry: &DomainCacheEntry) -> StoreResult<()> {
        self.domains.write().insert(entry.host.clone(), entry.clone());
        Ok(())
    }
}

#[async_trait]
impl BrandStore for InMemoryStore {
    async fn upsert_profile(&self, profile: &BrandProfile) -> StoreResult<()> {
        self.profiles
            .write()
            .insert(profile.seed_domain.clone(), profile.clone());
        Ok(())
    }

    async fn get_profile(&self, seed_domain: &str) -> StoreResult<Option<BrandProfile>> {
        Ok(self.profiles.read().get(seed_domain).cloned())
    }

    async fn insert_results(&self, seed_domain: &str, results: &[KeywordRisk]) -> StoreResult<u64> {
        let mut rows = self.keyword_results.write();
        rows.extend(results.iter().map(|r| (seed_domain.to_string(), r.clone())));
        Ok(results.len() as u64)
    }

    async fn upsert_coverage(&self, coverage: &CoverageResult) -> StoreResult<()> {
        self.coverage.write().insert(
            (coverage.seed_domain.clone(), coverage.account_id.clone()),
            coverage.clone(),
        );
        Ok(())
    }

    async fn get_coverage(&self, seed_domain: &str, account_id: &str) -> StoreResult<Option<CoverageResult>> {
        Ok(self
            .coverage
            .read()
            .get(&(seed_domain.to_string(), account_id.to_string()))
            .cloned())
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn insert_notification(&self, notification: &NewNotification) -> StoreResult<Notification> {
        let id = self.next_notification_id.fetch_add(1, Ordering::SeqCst) + 1;
        let row = Notification {
            id,
            user_id: notification.user_id.clone(),
            notification_type: notification.notification_type.clone(),
            title: notification.title.clone(),
            message: notification.message.clone(),
            created_at: Utc::now(),
        };
        self.notifications.write().push(row.clone());
        Ok(row)
    }

    async fn recent(&self, user_id: &str, limit: i64, cursor: Option<i64>) -> StoreResult<Vec<Notification>> {
        let mut rows: Vec<Notification> = self
            .notifications
            .read()
            .iter()
            .filter(|n| n.user_id == user_id && cursor.map_or(true, |c| n.id < c))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn by_severity(
        &self,
        severities: &[Severity],
        since: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Notification>> {
        let mut rows: Vec<Notification> = self
            .notifications
            .read()
            .iter()
            .filter(|n| n.created_at >= since && severities.contains(&n.message.severity))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn daily_incidents(&self, since: DateTime<Utc>) -> StoreResult<Vec<DailyIncidents>> {
        let mut counts: BTreeMap<(chrono::NaiveDate, &'static str), (Severity, i64)> = BTreeMap::new();
        for n in self.notifications.read().iter() {
            if n.created_at < since || n.message.severity == Severity::Info {
                continue;
            }
            let entry = counts
                .entry((n.created_at.date_naive(), n.message.severity.as_str()))
                .or_insert((n.message.severity, 0));
            entry.1 += 1;
        }
        Ok(counts
            .into_iter()
            .rev()
            .map(|((day, _), (severity, count))| DailyIncidents {
                day,
                severity,
                count,
            })
            .collect())
    }
}

#[async_trait]
impl PlanResolver for InMemoryStore {
    async fn plan_for(&self, user_id: &str) -> StoreResult<Option<String>> {
        Ok(self
            .subscriptions
            .read()
            .get(user_id)
            .filter(|s| s.is_active())
            .map(|s| s.plan.clone()))
    }
}

#[async_trait]
impl TokenLedger for InMemoryStore {
    async fn balance(&self, user_id: &str) -> StoreResult<TokenBalance> {
        Ok(self
            .balances
            .read()
            .get(user_id)
            .cloned()
            .unwrap_or(TokenBalance {
                user_id: user_id.to_string(),
                balance: 0,
                updated_at: None,
            }))
    }

    async fn apply(
        &self,
        user_id: &str,
        delta: i64,
        _kind: &str,
        _reason: Option<&str>,
        event: Option<&EventRecord>,
    ) -> StoreResult<TokenBalance> {
        // Single write lock plays the role of the transaction
        let mut balances = self.balances.write();
        let current = balances.get(user_id).map(|b| b.balance).unwrap_or(0);
        let next = current + delta;
        if next < 0 {
            return Err(StoreError::Conflict(format!(
                "insufficient balance: {} < {}",
                current, -delta
            )));
        }
        if let Some(record) = event {
            let mut events = self.events.write();
            if events.iter().any(|e| e.id == record.id) {
                return Err(StoreError::AlreadyExists(format!("event {}", record.id)));
            }
            events.push(record.clone());
        }
        let now = Utc::now();
        let updated = TokenBalance {
            user_id: user_id.to_string(),
            balance: next,
            updated_at: Some(now),
        };
        balances.insert(user_id.to_string(), updated.clone());
        self.ledger.write().push(LedgerEntry {
            user_id: user_id.to_string(),
            created_at: now,
        });
        Ok(updated)
    }
}

#[async_trait]
impl ConsoleStore for InMemoryStore {
    async fn list_users(&self, limit: i64, offset: i64) -> StoreResult<Vec<UserRecord>> {
        let mut users: Vec<UserRecord> = self.users.read().values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.read().get(id).cloned())
    }

    async fn set_role(&self, id: &str, role: Role) -> StoreResult<UserRecord> {
        let mut users = self.users.write();
        let user = users
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;
        user.role = role;
        Ok(user.clone())
    }

    async fn get_subscription(&self, user_id: &str) -> StoreResult<Option<Subscription>> {
        Ok(self.subscriptions.read().get(user_id).cloned())
    }

    async fn upsert_subscription(
        &self,
        user_id: &str,
        plan: &str,
        status: &str,
        event: Option<&EventRecord>,
    ) -> StoreResult<Subscription> {
        let now = Utc::now();
        let mut subscriptions = self.subscriptions.write();
        if let Some(record) = event {
            let mut events = self.events.write();
            if events.iter().any(|e| e.id == record.id) {
                return Err(StoreError::AlreadyExists(format!("event {}", record.id)));
            }
            events.push(record.clone());
        }
        let previous_end = subscriptions.get(user_id).and_then(|s| s.current_period_end);
        let mut subscription = Subscription {
            user_id: user_id.to_string(),
            plan: plan.to_string(),
            status: status.to_string(),
            current_period_end: previous_end,
            updated_at: now,
        };
        if subscription.is_active() {
            let base = previous_end.filter(|end| *end > now).unwrap_or(now);
            subscription.current_period_end = Some(base + Duration::days(SUBSCRIPTION_PERIOD_DAYS));
        }
        subscriptions.insert(user_id.to_string(), subscription.clone());
        Ok(subscription)
    }

    async fn token_stats(&self) -> StoreResult<TokenStats> {
        let balances = self.balances.read();
        let since = Utc::now() - Duration::hours(24);
        Ok(TokenStats {
            total_balance: balances.values().map(|b| b.balance).sum(),
            users_with_balance: balances.values().filter(|b| b.balance > 0).count() as i64,
            transactions_24h: self
                .ledger
                .read()
                .iter()
                .filter(|e| e.created_at >= since && !e.user_id.is_empty())
                .count() as i64,
        })
    }

    async fn stats(&self) -> StoreResult<ConsoleStats> {
        Ok(ConsoleStats {
            users: self.users.read().len() as i64,
            offers: self.offers.read().len() as i64,
            analyses: self.analyses.read().len() as i64,
            bulk_actions: self.operations.read().len() as i64,
            notifications: self.notifications.read().len() as i64,
            events: self.events.read().len() as i64,
        })
    }

    async fn get_config(&self, key: &str) -> StoreResult<Option<ConfigEntry>> {
        Ok(self.config.read().get(key).cloned())
    }

    async fn put_config(&self, key: &str, value: &Value) -> StoreResult<ConfigEntry> {
        let entry = ConfigEntry {
            key: key.to_string(),
            value: value.clone(),
            updated_at: Utc::now(),
        };
        self.config.write().insert(key.to_string(), entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl Readiness for InMemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

// ============================================================================
// Bus, secrets, doc cache, warehouse
// ============================================================================

/// In-process event bus: records every publish and fans out to subscribers
pub struct InMemoryBus {
    published: Mutex<Vec<(Envelope, Option<String>)>>,
    fail: AtomicBool,
    sender: broadcast::Sender<Envelope>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            published: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            sender,
        }
    }

    /// Envelopes published so far, with their idempotency keys
    pub fn published(&self) -> Vec<(Envelope, Option<String>)> {
        self.published.lock().clone()
    }

    /// Published envelopes of one type
    pub fn published_of(&self, event_type: &str) -> Vec<Envelope> {
        self.published
            .lock()
            .iter()
            .filter(|(e, _)| e.event_type == event_type)
            .map(|(e, _)| e.clone())
            .collect()
    }

    /// Make subsequent publishes fail
    pub fn fail_publishes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher for InMemoryBus {
    async fn publish(
        &self,
        envelope: &Envelope,
        idempotency_key: Option<&str>,
    ) -> Result<String, BusError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BusError::Publish("bus unavailable".to_string()));
        }
        self.published
            .lock()
            .push((envelope.clone(), idempotency_key.map(str::to_string)));
        // No receivers is fine
        let _ = self.sender.send(envelope.clone());
        Ok(envelope.id.clone())
    }
}

/// Versioned secrets kept in memory
#[derive(Default)]
pub struct InMemorySecrets {
    versions: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemorySecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(self, name: &str, value: &str) -> Self {
        self.versions
            .write()
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    pub fn version_count(&self, name: &str) -> usize {
        self.versions.read().get(name).map_or(0, Vec::len)
    }
}

#[async_trait]
impl SecretSource for InMemorySecrets {
    async fn access(&self, name: &str) -> Result<String, SecretError> {
        self.versions
            .read()
            .get(name)
            .and_then(|v| v.last().cloned())
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }

    async fn add_version(&self, name: &str, payload: &str) -> Result<(), SecretError> {
        self.versions
            .write()
            .entry(name.to_string())
            .or_default()
            .push(payload.to_string());
        Ok(())
    }
}

/// UI doc cache kept in memory
#[derive(Default)]
pub struct InMemoryUiDocs {
    docs: RwLock<Vec<(String, String, Value)>>,
}

impl InMemoryUiDocs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn docs(&self) -> Vec<(String, String, Value)> {
        self.docs.read().clone()
    }
}

#[async_trait]
impl UiDocStore for InMemoryUiDocs {
    async fn put_recent_event(&self, user_id: &str, event_id: &str, doc: &Value) -> Result<(), UpstreamError> {
        let mut docs = self.docs.write();
        docs.retain(|(u, e, _)| !(u == user_id && e == event_id));
        docs.push((user_id.to_string(), event_id.to_string(), doc.clone()));
        Ok(())
    }
}

/// Warehouse returning a fixed keyword list
pub struct StaticWarehouse {
    keywords: Vec<String>,
}

impl StaticWarehouse {
    pub fn new(keywords: Vec<String>) -> Self {
        Self { keywords }
    }
}

#[async_trait]
impl KeywordWarehouse for StaticWarehouse {
    async fn recent_keywords(&self, _account_id: Option<&str>, limit: usize) -> Result<Vec<String>, UpstreamError> {
        Ok(self.keywords.iter().take(limit).cloned().collect())
    }
}
