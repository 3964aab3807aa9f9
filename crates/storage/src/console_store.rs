// Users, token ledger, subscriptions, aggregates and console config

use async_trait::async_trait;
use autoads_core::console::{
    ConfigEntry, ConsoleStats, Role, Subscription, TokenBalance, TokenStats, UserRecord,
    MISSING_COUNT, SUBSCRIPTION_PERIOD_DAYS,
};
use autoads_core::records::EventRecord;
use autoads_core::{ConsoleStore, PlanResolver, StoreError, StoreResult, TokenLedger};
use serde_json::Value;
use sqlx::{Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

use crate::database::{db_err, Database};
use crate::models::{ConfigRow, SubscriptionRow, TokenBalanceRow, UserRow};

const CONSOLE_CONFIG_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS console_config (
    key TEXT PRIMARY KEY,
    value JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

impl Database {
    /// Row count of a table, -1 when the table does not exist
    async fn tolerant_count(&self, table: &'static str) -> StoreResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        match sqlx::query_scalar::<_, i64>(&sql).fetch_one(self.pool()).await {
            Ok(n) => Ok(n),
            Err(e) => match db_err(e) {
                StoreError::MissingTable(_) => Ok(MISSING_COUNT),
                other => Err(other),
            },
        }
    }

    async fn ensure_console_config(&self) -> StoreResult<()> {
        sqlx::query(CONSOLE_CONFIG_DDL)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

async fn append_event_tx(tx: &mut Transaction<'_, Postgres>, record: &EventRecord) -> StoreResult<()> {
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
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

#[async_trait]
impl PlanResolver for Database {
    async fn plan_for(&self, user_id: &str) -> StoreResult<Option<String>> {
        let plan = sqlx::query_scalar::<_, String>(
            r#"
            SELECT plan
            FROM user_subscriptions
            WHERE user_id = $1 AND LOWER(status) = 'active'
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await;

        match plan {
            Ok(plan) => Ok(plan),
            Err(e) => match db_err(e) {
                StoreError::MissingTable(_) => Ok(None),
                other => Err(other),
            },
        }
    }
}

#[async_trait]
impl TokenLedger for Database {
    async fn balance(&self, user_id: &str) -> StoreResult<TokenBalance> {
        let row = sqlx::query_as::<_, TokenBalanceRow>(
            "SELECT user_id, balance, updated_at FROM user_tokens WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(Into::into).unwrap_or(TokenBalance {
            user_id: user_id.to_string(),
            balance: 0,
            updated_at: None,
        }))
    }

    #[instrument(skip(self, reason, event))]
    async fn apply(
        &self,
        user_id: &str,
        delta: i64,
        kind: &str,
        reason: Option<&str>,
        event: Option<&EventRecord>,
    ) -> StoreResult<TokenBalance> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO user_tokens (user_id, balance, updated_at)
            VALUES ($1, 0, NOW())
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let current: i64 =
            sqlx::query_scalar("SELECT balance FROM user_tokens WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;

        if current + delta < 0 {
            return Err(StoreError::Conflict(format!(
                "insufficient balance: {} < {}",
                current, -delta
            )));
        }

        let row = sqlx::query_as::<_, TokenBalanceRow>(
            r#"
            UPDATE user_tokens
            SET balance = balance + $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING user_id, balance, updated_at
            "#,
        )
        .bind(user_id)
        .bind(delta)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO token_transactions (id, user_id, amount, kind, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(delta)
        .bind(kind)
        .bind(reason)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(record) = event {
            append_event_tx(&mut tx, record).await?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(row.into())
    }
}

#[async_trait]
impl ConsoleStore for Database {
    async fn list_users(&self, limit: i64, offset: i64) -> StoreResult<Vec<UserRecord>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, name, role, created_at
            FROM users
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        rows.into_iter().map(UserRow::into_user).collect()
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, role, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        row.map(UserRow::into_user).transpose()
    }

    async fn set_role(&self, id: &str, role: Role) -> StoreResult<UserRecord> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
            SET role = $2
            WHERE id = $1
            RETURNING id, email, name, role, created_at
            "#,
        )
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;

        row.into_user()
    }

    async fn get_subscription(&self, user_id: &str) -> StoreResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT user_id, plan, status, current_period_end, updated_at
            FROM user_subscriptions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(Into::into))
    }

    async fn upsert_subscription(
        &self,
        user_id: &str,
        plan: &str,
        status: &str,
        event: Option<&EventRecord>,
    ) -> StoreResult<Subscription> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        // Activation extends from the later of now and the current period end
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            INSERT INTO user_subscriptions (user_id, plan, status, current_period_end, updated_at)
            VALUES (
                $1, $2, $3,
                CASE WHEN LOWER($3) = 'active' THEN NOW() + make_interval(days => $4) ELSE NULL END,
                NOW()
            )
            ON CONFLICT (user_id) DO UPDATE
            SET plan = EXCLUDED.plan,
                status = EXCLUDED.status,
                current_period_end = CASE
                    WHEN LOWER(EXCLUDED.status) = 'active'
                        THEN GREATEST(COALESCE(user_subscriptions.current_period_end, NOW()), NOW()) + make_interval(days => $4)
                    ELSE user_subscriptions.current_period_end
                END,
                updated_at = NOW()
            RETURNING user_id, plan, status, current_period_end, updated_at
            "#,
        )
        .bind(user_id)
        .bind(plan)
        .bind(status)
        .bind(SUBSCRIPTION_PERIOD_DAYS as i32)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(record) = event {
            append_event_tx(&mut tx, record).await?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(row.into())
    }

    async fn token_stats(&self) -> StoreResult<TokenStats> {
        let balances = sqlx::query_as::<_, (Option<i64>, i64)>(
            "SELECT SUM(balance)::bigint, COUNT(*) FILTER (WHERE balance > 0) FROM user_tokens",
        )
        .fetch_one(self.pool())
        .await
        .map_err(db_err);

        let (total_balance, users_with_balance) = match balances {
            Ok((sum, users)) => (sum.unwrap_or(0), users),
            Err(StoreError::MissingTable(_)) => (MISSING_COUNT, MISSING_COUNT),
            Err(e) => return Err(e),
        };

        let transactions_24h = match sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM token_transactions WHERE created_at >= NOW() - INTERVAL '24 hours'",
        )
        .fetch_one(self.pool())
        .await
        .map_err(db_err)
        {
            Ok(n) => n,
            Err(StoreError::MissingTable(_)) => MISSING_COUNT,
            Err(e) => return Err(e),
        };

        Ok(TokenStats {
            total_balance,
            users_with_balance,
            transactions_24h,
        })
    }

    async fn stats(&self) -> StoreResult<ConsoleStats> {
        Ok(ConsoleStats {
            users: self.tolerant_count("users").await?,
            offers: self.tolerant_count("offers").await?,
            analyses: self.tolerant_count("siterank_analyses").await?,
            bulk_actions: self.tolerant_count("bulk_actions").await?,
            notifications: self.tolerant_count("user_notifications").await?,
            events: self.tolerant_count("event_store").await?,
        })
    }

    async fn get_config(&self, key: &str) -> StoreResult<Option<ConfigEntry>> {
        self.ensure_console_config().await?;
        let row = sqlx::query_as::<_, ConfigRow>(
            "SELECT key, value, updated_at FROM console_config WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(Into::into))
    }

    async fn put_config(&self, key: &str, value: &Value) -> StoreResult<ConfigEntry> {
        self.ensure_console_config().await?;
        let row = sqlx::query_as::<_, ConfigRow>(
            r#"
            INSERT INTO console_config (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, updated_at = NOW()
            RETURNING key, value, updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        Ok(row.into())
    }
}
