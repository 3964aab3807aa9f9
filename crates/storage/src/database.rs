// Database handle and error mapping

use anyhow::{Context, Result};
use async_trait::async_trait;
use autoads_core::{Readiness, StoreError, StoreResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

const UNIQUE_VIOLATION: &str = "23505";
const UNDEFINED_TABLE: &str = "42P01";

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }
}

#[async_trait]
impl Readiness for Database {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

/// Map a sqlx error onto the store taxonomy
pub(crate) fn db_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return StoreError::AlreadyExists(db.message().to_string()),
            Some(UNDEFINED_TABLE) => return StoreError::MissingTable(db.message().to_string()),
            _ => {}
        }
    }
    StoreError::Database(e.to_string())
}

/// Parse an enum column, surfacing garbage as a database error
pub(crate) fn parse_column<T>(value: &str) -> StoreResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse::<T>().map_err(StoreError::Database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoads_core::ads::BulkStatus;

    #[test]
    fn test_non_database_errors_map_to_database() {
        assert!(matches!(db_err(sqlx::Error::RowNotFound), StoreError::Database(_)));
    }

    #[test]
    fn test_parse_column() {
        assert_eq!(parse_column::<BulkStatus>("partial").unwrap(), BulkStatus::Partial);
        assert!(matches!(
            parse_column::<BulkStatus>("weird"),
            Err(StoreError::Database(_))
        ));
    }
}
