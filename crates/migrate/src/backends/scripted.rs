//! In-memory backend for tests that need transactions to fail, stall or
//! cancel on a chosen statement.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::core::{MigrationBackend, MigrationTransaction, SqlDialect, SqlParam};
use crate::migrations::definitions::LedgerEntry;

/// What the scripted transactions did
#[derive(Debug, Default)]
pub(crate) struct Journal {
    pub executed: Vec<(String, Vec<SqlParam>)>,
    pub begun: usize,
    pub committed: usize,
    pub rolled_back: usize,
}

/// Backend whose transactions misbehave on demand. Matching is by
/// substring of the statement text.
#[derive(Default, Clone)]
pub(crate) struct ScriptedBackend {
    pub journal: Arc<Mutex<Journal>>,
    pub fail_statement_containing: Option<&'static str>,
    pub fail_rollback: bool,
    /// 1-based commit number that fails
    pub fail_commit_on: Option<usize>,
    pub cancel_on_statement: Option<(&'static str, CancellationToken)>,
    pub slow_statement: Option<(&'static str, Duration)>,
}

pub(crate) struct ScriptedTransaction {
    backend: ScriptedBackend,
}

#[async_trait]
impl MigrationBackend for ScriptedBackend {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        Ok(())
    }

    async fn execute(&self, _sql: &str) -> Result<u64, sqlx::Error> {
        Ok(0)
    }

    async fn fetch_optional_id(&self, _sql: &str) -> Result<Option<i64>, sqlx::Error> {
        Ok(None)
    }

    async fn fetch_ledger(&self, _sql: &str) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        Ok(Vec::new())
    }

    async fn begin(&self) -> Result<Box<dyn MigrationTransaction>, sqlx::Error> {
        self.journal.lock().unwrap().begun += 1;
        Ok(Box::new(ScriptedTransaction {
            backend: self.clone(),
        }))
    }

    async fn close(&self) {}
}

#[async_trait]
impl MigrationTransaction for ScriptedTransaction {
    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64, sqlx::Error> {
        if let Some((needle, delay)) = self.backend.slow_statement {
            if sql.contains(needle) {
                tokio::time::sleep(delay).await;
            }
        }
        if let Some((needle, token)) = &self.backend.cancel_on_statement {
            if sql.contains(needle) {
                token.cancel();
            }
        }
        if let Some(needle) = self.backend.fail_statement_containing {
            if sql.contains(needle) {
                return Err(sqlx::Error::Protocol(format!("rejected: {}", sql)));
            }
        }
        self.backend
            .journal
            .lock()
            .unwrap()
            .executed
            .push((sql.to_string(), params.to_vec()));
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        let mut journal = self.backend.journal.lock().unwrap();
        if self.backend.fail_commit_on == Some(journal.committed + 1) {
            return Err(sqlx::Error::Protocol("disk full".to_string()));
        }
        journal.committed += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error> {
        if self.backend.fail_rollback {
            return Err(sqlx::Error::Protocol("connection reset".to_string()));
        }
        self.backend.journal.lock().unwrap().rolled_back += 1;
        Ok(())
    }
}
