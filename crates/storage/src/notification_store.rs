// User notifications

use async_trait::async_trait;
use autoads_core::notification::{DailyIncidents, NewNotification, Notification, Severity};
use autoads_core::{NotificationStore, StoreResult};
use chrono::{DateTime, NaiveDate, Utc};

use crate::database::{db_err, parse_column, Database};
use crate::models::NotificationRow;

#[async_trait]
impl NotificationStore for Database {
    async fn insert_notification(&self, notification: &NewNotification) -> StoreResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO user_notifications (user_id, type, title, message)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, type, title, message, created_at
            "#,
        )
        .bind(&notification.user_id)
        .bind(&notification.notification_type)
        .bind(&notification.title)
        .bind(serde_json::to_value(&notification.message)?)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        row.into_notification()
    }

    async fn recent(&self, user_id: &str, limit: i64, cursor: Option<i64>) -> StoreResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, type, title, message, created_at
            FROM user_notifications
            WHERE user_id = $1 AND ($2::bigint IS NULL OR id < $2)
            ORDER BY id DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(cursor)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        rows.into_iter().map(NotificationRow::into_notification).collect()
    }

    async fn by_severity(
        &self,
        severities: &[Severity],
        since: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Notification>> {
        let wanted: Vec<String> = severities.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, type, title, message, created_at
            FROM user_notifications
            WHERE message->>'severity' = ANY($1) AND created_at >= $2
            ORDER BY id DESC
            LIMIT $3
            "#,
        )
        .bind(&wanted)
        .bind(since)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        rows.into_iter().map(NotificationRow::into_notification).collect()
    }

    async fn daily_incidents(&self, since: DateTime<Utc>) -> StoreResult<Vec<DailyIncidents>> {
        let rows: Vec<(NaiveDate, String, i64)> = sqlx::query_as(
            r#"
            SELECT (created_at AT TIME ZONE 'UTC')::date AS day, message->>'severity' AS severity, COUNT(*) AS count
            FROM user_notifications
            WHERE created_at >= $1 AND message->>'severity' IN ('warn', 'error')
            GROUP BY 1, 2
            ORDER BY 1 DESC, 2
            "#,
        )
        .bind(since)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|(day, severity, count)| {
                Ok(DailyIncidents {
                    day,
                    severity: parse_column(&severity)?,
                    count,
                })
            })
            .collect()
    }
}
