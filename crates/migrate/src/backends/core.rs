//! Core Database Backend Traits
//!
//! The engine talks to the database only through these traits so that the
//! same loader/executor runs on SQLite and PostgreSQL, and so tests can
//! script transaction failures.

use async_trait::async_trait;

use crate::migrations::definitions::LedgerEntry;

/// SQL dialect differences the ledger cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Sqlite,
    PostgreSQL,
}

impl SqlDialect {
    /// Bind placeholder for the 1-based parameter `index`
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::Sqlite => "?".to_string(),
            SqlDialect::PostgreSQL => format!("${}", index),
        }
    }

    /// Column type for the ledger timestamp
    pub fn timestamp_column(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "DATETIME DEFAULT CURRENT_TIMESTAMP",
            SqlDialect::PostgreSQL => "TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP",
        }
    }

    /// Column type for migration ids
    pub fn id_column(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "INTEGER PRIMARY KEY",
            SqlDialect::PostgreSQL => "BIGINT PRIMARY KEY",
        }
    }
}

/// Parameter value bound to a ledger statement
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Text(String),
}

/// Database handle the migration engine runs against
#[async_trait]
pub trait MigrationBackend: Send + Sync {
    /// Dialect used to render ledger SQL
    fn dialect(&self) -> SqlDialect;

    /// Check the handle is open and a connection answers
    async fn ping(&self) -> Result<(), sqlx::Error>;

    /// Execute a statement outside any migration transaction
    async fn execute(&self, sql: &str) -> Result<u64, sqlx::Error>;

    /// Run a query selecting a single integer column, `None` when no row
    async fn fetch_optional_id(&self, sql: &str) -> Result<Option<i64>, sqlx::Error>;

    /// Run a query selecting `id, name, executed_at` rows
    async fn fetch_ledger(&self, sql: &str) -> Result<Vec<LedgerEntry>, sqlx::Error>;

    /// Begin a transaction
    async fn begin(&self) -> Result<Box<dyn MigrationTransaction>, sqlx::Error>;

    /// Close the underlying pool
    async fn close(&self);
}

/// Open transaction on a [`MigrationBackend`]
#[async_trait]
pub trait MigrationTransaction: Send {
    /// Execute a statement within the transaction
    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64, sqlx::Error>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error>;
}
