// Store bundle handed to the services
//
// One concrete store (Postgres or in-memory) seen through every trait a
// service may need. Without DATABASE_URL the bundle is in-memory.

use std::sync::Arc;

use anyhow::Result;
use autoads_core::memory::InMemoryStore;
use autoads_core::{
    AnalysisStore, BrandStore, BulkActionStore, ConnectionStore, ConsoleStore, DomainCacheStore,
    EventStore, IdempotencyStore, NotificationStore, OfferStore, PlanResolver, ProjectionStore,
    Readiness, TokenLedger,
};

use crate::database::Database;

#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventStore>,
    pub projections: Arc<dyn ProjectionStore>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub connections: Arc<dyn ConnectionStore>,
    pub bulk: Arc<dyn BulkActionStore>,
    pub offers: Arc<dyn OfferStore>,
    pub analyses: Arc<dyn AnalysisStore>,
    pub domains: Arc<dyn DomainCacheStore>,
    pub brands: Arc<dyn BrandStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub plans: Arc<dyn PlanResolver>,
    pub ledger: Arc<dyn TokenLedger>,
    pub console: Arc<dyn ConsoleStore>,
    pub readiness: Arc<dyn Readiness>,
}

impl Stores {
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: EventStore
            + ProjectionStore
            + IdempotencyStore
            + ConnectionStore
            + BulkActionStore
            + OfferStore
            + AnalysisStore
            + DomainCacheStore
            + BrandStore
            + NotificationStore
            + PlanResolver
            + TokenLedger
            + ConsoleStore
            + Readiness
            + 'static,
    {
        Self {
            events: store.clone(),
            projections: store.clone(),
            idempotency: store.clone(),
            connections: store.clone(),
            bulk: store.clone(),
            offers: store.clone(),
            analyses: store.clone(),
            domains: store.clone(),
            brands: store.clone(),
            notifications: store.clone(),
            plans: store.clone(),
            ledger: store.clone(),
            console: store.clone(),
            readiness: store,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_shared(Arc::new(InMemoryStore::new()))
    }

    /// Postgres when a URL is given, else in-memory
    pub async fn connect(database_url: Option<&str>, run_migrations: bool) -> Result<Self> {
        let Some(url) = database_url.filter(|u| !u.trim().is_empty()) else {
            tracing::warn!("DATABASE_URL not set, using in-memory stores (data is not persisted)");
            return Ok(Self::in_memory());
        };

        let db = Database::from_url(url).await?;
        tracing::info!("Connected to database");
        if run_migrations {
            db.migrate().await?;
            tracing::info!("Database migrations applied");
        }
        Ok(Self::from_shared(Arc::new(db)))
    }
}
