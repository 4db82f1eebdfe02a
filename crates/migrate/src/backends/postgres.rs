//! PostgreSQL Backend Implementation
//!
//! sqlx `PgPool` behind the [`MigrationBackend`] traits.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Connection, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::debug;

use super::core::{MigrationBackend, MigrationTransaction, SqlDialect, SqlParam};
use crate::config::DatabaseConfig;
use crate::migrations::definitions::LedgerEntry;

/// PostgreSQL database backend
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Wrap an already open pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .test_before_acquire(true)
            .connect(&config.url)
            .await?;

        debug!("opened postgres pool");
        Ok(Self::new(pool))
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MigrationBackend for PostgresBackend {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
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

        rows.iter()
            .map(|row| {
                Ok(LedgerEntry {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    applied_at: row.try_get::<NaiveDateTime, _>("executed_at")?,
                })
            })
            .collect()
    }

    async fn begin(&self) -> Result<Box<dyn MigrationTransaction>, sqlx::Error> {
        let inner = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { inner }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Transaction on a [`PostgresBackend`]
pub struct PostgresTransaction {
    inner: Transaction<'static, Postgres>,
}

#[async_trait]
impl MigrationTransaction for PostgresTransaction {
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
