// Offers, Siterank analyses and the shared domain cache

use async_trait::async_trait;
use autoads_core::offer::Offer;
use autoads_core::siterank::{Analysis, AnalysisStatus, DomainCacheEntry};
use autoads_core::{AnalysisStore, DomainCacheStore, OfferStore, StoreError, StoreResult};
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::database::{db_err, Database};
use crate::models::{AnalysisRow, DomainCacheRow, OfferRow};

const ANALYSIS_COLUMNS: &str =
    "id, user_id, offer_id, status, result, error, created_at, updated_at, started_at, completed_at";

#[async_trait]
impl OfferStore for Database {
    #[instrument(skip(self, offer), fields(offer_id = %offer.id))]
    async fn create_offer(&self, offer: &Offer) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO offers (id, user_id, name, url, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&offer.id)
        .bind(&offer.user_id)
        .bind(&offer.name)
        .bind(&offer.url)
        .bind(&offer.status)
        .bind(offer.created_at)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_offer(&self, id: &str) -> StoreResult<Option<Offer>> {
        let row = sqlx::query_as::<_, OfferRow>(
            r#"
            SELECT id, user_id, name, url, status, created_at
            FROM offers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(Into::into))
    }
}

impl Database {
    async fn set_analysis_state(
        &self,
        id: Uuid,
        status: AnalysisStatus,
        result: Option<Value>,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let outcome = sqlx::query(
            r#"
            UPDATE siterank_analyses
            SET status = $2,
                result = COALESCE($3, result),
                error = $4,
                started_at = CASE WHEN $2 = 'running' THEN NOW() ELSE started_at END,
                completed_at = CASE WHEN $2 IN ('completed', 'failed') THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(result)
        .bind(error)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        if outcome.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("analysis {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl AnalysisStore for Database {
    #[instrument(skip(self, analysis), fields(analysis_id = %analysis.id, offer_id = %analysis.offer_id))]
    async fn create_analysis(&self, analysis: &Analysis) -> StoreResult<()> {
        // The partial unique index on active analyses surfaces as AlreadyExists
        sqlx::query(
            r#"
            INSERT INTO siterank_analyses (id, user_id, offer_id, status, result, error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(analysis.id)
        .bind(&analysis.user_id)
        .bind(&analysis.offer_id)
        .bind(analysis.status.as_str())
        .bind(&analysis.result)
        .bind(&analysis.error)
        .bind(analysis.created_at)
        .bind(analysis.updated_at)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_analysis(&self, id: Uuid) -> StoreResult<Option<Analysis>> {
        let row = sqlx::query_as::<_, AnalysisRow>(&format!(
            "SELECT {} FROM siterank_analyses WHERE id = $1",
            ANALYSIS_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        row.map(AnalysisRow::into_analysis).transpose()
    }

    async fn latest_for_offer(&self, offer_id: &str, user_id: Option<&str>) -> StoreResult<Option<Analysis>> {
        let row = sqlx::query_as::<_, AnalysisRow>(&format!(
            r#"
            SELECT {}
            FROM siterank_analyses
            WHERE offer_id = $1 AND ($2::text IS NULL OR user_id = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            ANALYSIS_COLUMNS
        ))
        .bind(offer_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        row.map(AnalysisRow::into_analysis).transpose()
    }

    async fn mark_running(&self, id: Uuid) -> StoreResult<()> {
        self.set_analysis_state(id, AnalysisStatus::Running, None, None)
            .await
    }

    async fn mark_completed(&self, id: Uuid, result: Value) -> StoreResult<()> {
        self.set_analysis_state(id, AnalysisStatus::Completed, Some(result), None)
            .await
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> StoreResult<()> {
        self.set_analysis_state(id, AnalysisStatus::Failed, None, Some(reason))
            .await
    }
}

#[async_trait]
impl DomainCacheStore for Database {
    async fn get_domain(&self, host: &str) -> StoreResult<Option<DomainCacheEntry>> {
        let row = sqlx::query_as::<_, DomainCacheRow>(
            r#"
            SELECT host, payload, ok, updated_at, expires_at
            FROM domain_cache
            WHERE host = $1
            "#,
        )
        .bind(host)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(Into::into))
    }

    async fn put_domain(&self, entry: &DomainCacheEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO domain_cache (host, payload, ok, updated_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (host) DO UPDATE
            SET payload = EXCLUDED.payload,
                ok = EXCLUDED.ok,
                updated_at = EXCLUDED.updated_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&entry.host)
        .bind(&entry.payload)
        .bind(entry.ok)
        .bind(entry.updated_at)
        .bind(entry.expires_at)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
