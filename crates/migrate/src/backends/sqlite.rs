//! SQLite Backend Implementation
//!
//! sqlx `SqlitePool` behind the [`MigrationBackend`] traits. SQLite DDL is
//! transactional, so a failed migration leaves no partial schema behind.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Connection, Row, Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::core::{MigrationBackend, MigrationTransaction, SqlDialect, SqlParam};
use crate::config::DatabaseConfig;
use crate::migrations::definitions::LedgerEntry;

/// SQLite database backend
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Wrap an already open pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration, creating the database file if needed
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await?;

        debug!(url = %config.url, "opened sqlite pool");
        Ok(Self::new(pool))
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MigrationBackend for SqliteBackend {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        if self.pool.is_closed() {
            return Err(sqlx::Error::PoolClosed);
        }
        let mut conn = self.pool.acquire().await?;
        conn.ping().await
    }

    async fn execute(&self, sql: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_optional_id(&self, sql: &str) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_optional(&self.pool)
            .await
    }

    async fn fetch_ledger(&self, sql: &str) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(LedgerEntry {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                applied_at: row.try_get::<NaiveDateTime, _>("executed_at")?,
            });
        }
        Ok(entries)
    }

    async fn begin(&self) -> Result<Box<dyn MigrationTransaction>, sqlx::Error> {
        let inner = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction { inner }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Transaction on a [`SqliteBackend`]; dropping it uncommitted rolls back
pub struct SqliteTransaction {
    inner: Transaction<'static, Sqlite>,
}

#[async_trait]
impl MigrationTransaction for SqliteTransaction {
    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64, sqlx::Error> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                SqlParam::Int(value) => query.bind(*value),
                SqlParam::Text(value) => query.bind(value.clone()),
            };
        }
        let result = query.execute(&mut *self.inner).await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.inner.rollback().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_backend() -> SqliteBackend {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteBackend::new(pool)
    }

    #[tokio::test]
    async fn test_ping_and_close() {
        let backend = memory_backend().await;
        assert!(backend.ping().await.is_ok());

        backend.close().await;
        assert!(matches!(backend.ping().await, Err(sqlx::Error::PoolClosed)));
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards_ddl() {
        let backend = memory_backend().await;

        let mut tx = backend.begin().await.unwrap();
        tx.execute("CREATE TABLE scratch (id INTEGER);", &[]).await.unwrap();
        tx.rollback().await.unwrap();

        let count = backend
            .fetch_optional_id("SELECT COUNT(*) FROM sqlite_master WHERE name = 'scratch'")
            .await
            .unwrap();
        assert_eq!(count, Some(0));
    }

    #[tokio::test]
    async fn test_bound_parameters() {
        let backend = memory_backend().await;
        backend
            .execute("CREATE TABLE kv (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .await
            .unwrap();

        let mut tx = backend.begin().await.unwrap();
        let affected = tx
            .execute(
                "INSERT INTO kv (id, name) VALUES (?, ?)",
                &[SqlParam::Int(7), SqlParam::Text("seven".to_string())],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);
        tx.commit().await.unwrap();

        assert_eq!(backend.fetch_optional_id("SELECT id FROM kv").await.unwrap(), Some(7));
    }
}
