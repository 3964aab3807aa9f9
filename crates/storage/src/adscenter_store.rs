// Ads connections, bulk operations, snapshots and dead letters

use async_trait::async_trait;
use autoads_core::ads::{
    BulkOperation, BulkStatus, DeadLetter, DeadLetterStatus, Snapshot, UserAdsConnection,
};
use autoads_core::{BulkActionStore, ConnectionStore, StoreError, StoreResult};
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::database::{db_err, Database};
use crate::models::{BulkActionRow, ConnectionRow, DeadLetterRow, SnapshotRow};

#[async_trait]
impl ConnectionStore for Database {
    async fn get_connection(&self, user_id: &str) -> StoreResult<Option<UserAdsConnection>> {
        let row = sqlx::query_as::<_, ConnectionRow>(
            r#"
            SELECT user_id, login_customer_id, primary_customer_id, refresh_token, updated_at
            FROM user_ads_connections
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, connection), fields(user_id = %connection.user_id))]
    async fn upsert_connection(&self, connection: &UserAdsConnection) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_ads_connections (user_id, login_customer_id, primary_customer_id, refresh_token, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
            SET login_customer_id = COALESCE(EXCLUDED.login_customer_id, user_ads_connections.login_customer_id),
                primary_customer_id = COALESCE(EXCLUDED.primary_customer_id, user_ads_connections.primary_customer_id),
                refresh_token = EXCLUDED.refresh_token,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&connection.user_id)
        .bind(&connection.login_customer_id)
        .bind(&connection.primary_customer_id)
        .bind(&connection.refresh_token)
        .bind(connection.updated_at)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn update_refresh_token(&self, user_id: &str, refresh_token: &str) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE user_ads_connections
            SET refresh_token = $2, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(refresh_token)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("connection for {}", user_id)));
        }
        Ok(())
    }

    async fn list_connections(&self, offset: i64, limit: i64) -> StoreResult<Vec<UserAdsConnection>> {
        let rows = sqlx::query_as::<_, ConnectionRow>(
            r#"
            SELECT user_id, login_customer_id, primary_customer_id, refresh_token, updated_at
            FROM user_ads_connections
            ORDER BY user_id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl BulkActionStore for Database {
    #[instrument(skip(self, operation), fields(operation_id = %operation.id))]
    async fn create_operation(&self, operation: &BulkOperation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bulk_actions (id, user_id, status, validate_only, actions, summary, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(operation.id)
        .bind(&operation.user_id)
        .bind(operation.status.as_str())
        .bind(operation.validate_only)
        .bind(serde_json::to_value(&operation.actions)?)
        .bind(&operation.summary)
        .bind(operation.created_at)
        .bind(operation.updated_at)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_operation(&self, id: Uuid) -> StoreResult<Option<BulkOperation>> {
        let row = sqlx::query_as::<_, BulkActionRow>(
            r#"
            SELECT id, user_id, status, validate_only, actions, summary, created_at, updated_at
            FROM bulk_actions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        row.map(BulkActionRow::into_operation).transpose()
    }

    async fn update_operation_status(
        &self,
        id: Uuid,
        status: BulkStatus,
        summary: Option<Value>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE bulk_actions
            SET status = $2, summary = COALESCE($3, summary), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(summary)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("bulk action {}", id)));
        }
        Ok(())
    }

    async fn add_snapshot(&self, snapshot: &Snapshot) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bulk_action_snapshots (id, operation_id, action_index, phase, data, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(snapshot.id)
        .bind(snapshot.operation_id)
        .bind(snapshot.action_index)
        .bind(snapshot.phase.as_str())
        .bind(&snapshot.data)
        .bind(snapshot.created_at)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn list_snapshots(&self, operation_id: Uuid) -> StoreResult<Vec<Snapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT id, operation_id, action_index, phase, data, created_at
            FROM bulk_action_snapshots
            WHERE operation_id = $1
            ORDER BY action_index, created_at
            "#,
        )
        .bind(operation_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    async fn add_dead_letter(&self, dead_letter: &DeadLetter) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bulk_action_dead_letters
                (id, operation_id, action_index, action_type, customer_id, operation, error, retry_count, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(dead_letter.id)
        .bind(dead_letter.operation_id)
        .bind(dead_letter.action_index)
        .bind(dead_letter.action_type.as_str())
        .bind(&dead_letter.customer_id)
        .bind(&dead_letter.operation)
        .bind(&dead_letter.error)
        .bind(dead_letter.retry_count)
        .bind(dead_letter.status.as_str())
        .bind(dead_letter.created_at)
        .bind(dead_letter.updated_at)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn list_dead_letters(&self, operation_id: Uuid) -> StoreResult<Vec<DeadLetter>> {
        let rows = sqlx::query_as::<_, DeadLetterRow>(
            r#"
            SELECT id, operation_id, action_index, action_type, customer_id, operation, error, retry_count, status, created_at, updated_at
            FROM bulk_action_dead_letters
            WHERE operation_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(operation_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DeadLetterRow::into_dead_letter).collect()
    }

    async fn get_dead_letter(&self, operation_id: Uuid, id: Uuid) -> StoreResult<Option<DeadLetter>> {
        let row = sqlx::query_as::<_, DeadLetterRow>(
            r#"
            SELECT id, operation_id, action_index, action_type, customer_id, operation, error, retry_count, status, created_at, updated_at
            FROM bulk_action_dead_letters
            WHERE operation_id = $1 AND id = $2
            "#,
        )
        .bind(operation_id)
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        row.map(DeadLetterRow::into_dead_letter).transpose()
    }

    async fn record_dead_letter_retry(
        &self,
        id: Uuid,
        status: DeadLetterStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE bulk_action_dead_letters
            SET retry_count = retry_count + 1,
                status = $2,
                error = COALESCE($3, error),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("dead letter {}", id)));
        }
        Ok(())
    }
}
