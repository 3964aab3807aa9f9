// Event store, projections and idempotency bindings

use async_trait::async_trait;
use autoads_core::idempotency::IdempotencyBinding;
use autoads_core::records::{EventFilter, EventProjection, EventRecord};
use autoads_core::{EventStore, IdempotencyStore, ProjectionStore, StoreResult};
use sqlx::{Postgres, QueryBuilder};
use tracing::instrument;

use crate::database::{db_err, Database};
use crate::models::EventRow;

#[async_trait]
impl EventStore for Database {
    #[instrument(skip(self, record), fields(event_id = %record.id))]
    async fn append(&self, record: &EventRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO event_store (id, event_name, aggregate_type, aggregate_id, user_id, payload, idempotency_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&record.id)
        .bind(&record.event_name)
        .bind(&record.aggregate_type)
        .bind(&record.aggregate_id)
        .bind(&record.user_id)
        .bind(&record.payload)
        .bind(&record.idempotency_key)
        .bind(record.created_at)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn query(&self, filter: &EventFilter) -> StoreResult<Vec<EventRecord>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, event_name, aggregate_type, aggregate_id, user_id, payload, idempotency_key, created_at FROM event_store WHERE TRUE",
        );
        if let Some(name) = &filter.event_name {
            qb.push(" AND event_name = ").push_bind(name);
        }
        if let Some(aggregate_type) = &filter.aggregate_type {
            qb.push(" AND aggregate_type = ").push_bind(aggregate_type);
        }
        if let Some(aggregate_id) = &filter.aggregate_id {
            qb.push(" AND aggregate_id = ").push_bind(aggregate_id);
        }
        if let Some(since) = filter.since {
            qb.push(" AND created_at >= ").push_bind(since);
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit.max(0));

        let rows = qb
            .build_query_as::<EventRow>()
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<EventRecord>> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, event_name, aggregate_type, aggregate_id, user_id, payload, idempotency_key, created_at
            FROM event_store
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

#[async_trait]
impl ProjectionStore for Database {
    #[instrument(skip(self, projection), fields(event_id = %projection.event_id))]
    async fn insert_if_absent(&self, projection: &EventProjection) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO event_projection (event_id, event_name, aggregate_type, aggregate_id, processed_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&projection.event_id)
        .bind(&projection.event_name)
        .bind(&projection.aggregate_type)
        .bind(&projection.aggregate_id)
        .bind(projection.processed_at)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl IdempotencyStore for Database {
    async fn lookup(&self, key: &str, user_id: &str, scope: &str) -> StoreResult<Option<String>> {
        let target: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT target_id
            FROM idempotency_keys
            WHERE key = $1 AND user_id = $2 AND scope = $3 AND expires_at > NOW()
            "#,
        )
        .bind(key)
        .bind(user_id)
        .bind(scope)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(target.map(|(t,)| t))
    }

    async fn bind(&self, binding: &IdempotencyBinding) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, user_id, scope, target_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (key, user_id, scope) DO UPDATE
            SET target_id = EXCLUDED.target_id,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&binding.key)
        .bind(&binding.user_id)
        .bind(&binding.scope)
        .bind(&binding.target_id)
        .bind(binding.created_at)
        .bind(binding.expires_at)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= NOW()")
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}
