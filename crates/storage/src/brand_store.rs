// Brand profiles, keyword risk results and coverage

use async_trait::async_trait;
use autoads_core::brand::{BrandProfile, CoverageResult, KeywordRisk};
use autoads_core::{BrandStore, StoreResult};
use sqlx::{Postgres, QueryBuilder};

use crate::database::{db_err, Database};
use crate::models::{BrandProfileRow, CoverageRow};

/// Rows per multi-row insert (7 binds per row)
const INSERT_CHUNK: usize = 500;

#[async_trait]
impl BrandStore for Database {
    async fn upsert_profile(&self, profile: &BrandProfile) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO brand_profiles (seed_domain, aliases, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (seed_domain) DO UPDATE
            SET aliases = EXCLUDED.aliases, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&profile.seed_domain)
        .bind(serde_json::to_value(&profile.aliases)?)
        .bind(profile.updated_at)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_profile(&self, seed_domain: &str) -> StoreResult<Option<BrandProfile>> {
        let row = sqlx::query_as::<_, BrandProfileRow>(
            r#"
            SELECT seed_domain, aliases, updated_at
            FROM brand_profiles
            WHERE seed_domain = $1
            "#,
        )
        .bind(seed_domain)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        row.map(BrandProfileRow::into_profile).transpose()
    }

    async fn insert_results(&self, seed_domain: &str, results: &[KeywordRisk]) -> StoreResult<u64> {
        let mut written = 0u64;
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        for chunk in results.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO keyword_risk_results (seed_domain, keyword, contains_brand, matched_alias, method, score, severity, created_at) ",
            );
            qb.push_values(chunk, |mut b, r| {
                b.push_bind(seed_domain)
                    .push_bind(&r.keyword)
                    .push_bind(r.contains_brand)
                    .push_bind(&r.matched_alias)
                    .push_bind(r.method.as_str())
                    .push_bind(r.score)
                    .push_bind(r.severity.as_str())
                    .push("NOW()");
            });
            let result = qb.build().execute(&mut *tx).await.map_err(db_err)?;
            written += result.rows_affected();
        }

        tx.commit().await.map_err(db_err)?;
        Ok(written)
    }

    async fn upsert_coverage(&self, coverage: &CoverageResult) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO brand_coverage_results
                (seed_domain, account_id, total_keywords, brand_keywords, coverage_ratio, missing_aliases, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (seed_domain, account_id) DO UPDATE
            SET total_keywords = EXCLUDED.total_keywords,
                brand_keywords = EXCLUDED.brand_keywords,
                coverage_ratio = EXCLUDED.coverage_ratio,
                missing_aliases = EXCLUDED.missing_aliases,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&coverage.seed_domain)
        .bind(&coverage.account_id)
        .bind(coverage.coverage.total_keywords)
        .bind(coverage.coverage.brand_keywords)
        .bind(coverage.coverage.coverage_ratio)
        .bind(serde_json::to_value(&coverage.coverage.missing_aliases)?)
        .bind(coverage.updated_at)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_coverage(&self, seed_domain: &str, account_id: &str) -> StoreResult<Option<CoverageResult>> {
        let row = sqlx::query_as::<_, CoverageRow>(
            r#"
            SELECT seed_domain, account_id, total_keywords, brand_keywords, coverage_ratio, missing_aliases, updated_at
            FROM brand_coverage_results
            WHERE seed_domain = $1 AND account_id = $2
            "#,
        )
        .bind(seed_domain)
        .bind(account_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        row.map(CoverageRow::into_result).transpose()
    }
}
