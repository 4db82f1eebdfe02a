//! Version Ledger - the table of applied migrations
//!
//! The highest recorded id is the schema version; an empty ledger is
//! version 0. Rows are only written through a migration's own transaction.

use tracing::{debug, warn};

use super::definitions::LedgerEntry;
use crate::backends::{MigrationBackend, MigrationTransaction, SqlDialect, SqlParam};
use crate::error::{MigrationError, MigrationResult};

/// Ledger table accessor
#[derive(Debug, Clone)]
pub struct Ledger {
    table: String,
    dialect: SqlDialect,
}

impl Ledger {
    /// `table` must already be validated as a plain identifier
    pub fn new(table: impl Into<String>, dialect: SqlDialect) -> Self {
        Self {
            table: table.into(),
            dialect,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// SQL to create the ledger table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id {},\n    \
                name TEXT NOT NULL,\n    \
                executed_at {}\n\
            )",
            self.table,
            self.dialect.id_column(),
            self.dialect.timestamp_column()
        )
    }

    /// SQL to get the last applied id
    pub fn last_applied_sql(&self) -> String {
        format!("SELECT id FROM {} ORDER BY id DESC LIMIT 1", self.table)
    }

    /// SQL to record a migration as applied
    pub fn record_sql(&self) -> String {
        format!(
            "INSERT INTO {} (id, name) VALUES ({}, {})",
            self.table,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2)
        )
    }

    /// SQL to remove a migration record
    pub fn unrecord_sql(&self) -> String {
        format!("DELETE FROM {} WHERE id = {}", self.table, self.dialect.placeholder(1))
    }

    /// SQL to list all entries
    pub fn entries_sql(&self) -> String {
        format!("SELECT id, name, executed_at FROM {} ORDER BY id ASC", self.table)
    }

    /// Create the ledger table if it does not exist
    pub async fn ensure_table(&self, backend: &dyn MigrationBackend) -> MigrationResult<()> {
        debug!(table = %self.table, "ensuring ledger table");
        backend
            .execute(&self.create_table_sql())
            .await
            .map_err(|source| MigrationError::LedgerTable { source })?;
        Ok(())
    }

    /// Highest applied id, 0 when nothing is applied
    pub async fn last_applied_id(&self, backend: &dyn MigrationBackend) -> MigrationResult<i64> {
        let last = backend
            .fetch_optional_id(&self.last_applied_sql())
            .await
            .map_err(|source| MigrationError::LedgerQuery { source })?;
        Ok(last.unwrap_or(0))
    }

    /// All ledger rows, ascending by id
    pub async fn entries(&self, backend: &dyn MigrationBackend) -> MigrationResult<Vec<LedgerEntry>> {
        backend
            .fetch_ledger(&self.entries_sql())
            .await
            .map_err(|source| MigrationError::LedgerQuery { source })
    }

    /// Insert the row for `id` inside the migration's transaction
    pub async fn record(
        &self,
        tx: &mut dyn MigrationTransaction,
        id: i64,
        name: &str,
    ) -> Result<(), sqlx::Error> {
        tx.execute(&self.record_sql(), &[SqlParam::Int(id), SqlParam::Text(name.to_string())])
            .await?;
        Ok(())
    }

    /// Delete the row for `id` inside the migration's transaction
    pub async fn unrecord(&self, tx: &mut dyn MigrationTransaction, id: i64) -> Result<(), sqlx::Error> {
        let removed = tx.execute(&self.unrecord_sql(), &[SqlParam::Int(id)]).await?;
        if removed == 0 {
            warn!(migration_id = id, table = %self.table, "ledger had no row to remove");
        }
        Ok(())
    }
}
