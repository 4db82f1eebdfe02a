//! Transactional Executor - applies a MigrationSet one migration at a time
//!
//! Each migration runs in its own transaction together with its ledger
//! update. A failure stops the run; everything committed before it stays.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::definitions::{Direction, Migration, MigrationSet};
use super::ledger::Ledger;
use super::statements::split_sql_statements;
use crate::backends::{MigrationBackend, MigrationTransaction};
use crate::error::{MigrationError, MigrationResult, RunFailure, RunStage};

/// Executes migration sets against a backend
pub struct MigrationExecutor<'a> {
    backend: &'a dyn MigrationBackend,
    ledger: &'a Ledger,
}

impl<'a> MigrationExecutor<'a> {
    pub fn new(backend: &'a dyn MigrationBackend, ledger: &'a Ledger) -> Self {
        Self { backend, ledger }
    }

    /// Apply every migration in `set`, in order.
    ///
    /// Returns the ids committed. On failure the returned [`RunFailure`]
    /// carries how many migrations were committed before it.
    pub async fn apply(&self, set: &MigrationSet, cancel: &CancellationToken) -> Result<Vec<i64>, RunFailure> {
        let direction = set.direction();
        let mut applied = Vec::with_capacity(set.len());

        for migration in set {
            if cancel.is_cancelled() {
                info!(applied = applied.len(), "migration run cancelled");
                return Err(RunFailure::new(
                    RunStage::Executing,
                    applied.len(),
                    MigrationError::Cancelled {
                        applied: applied.len(),
                        rollback: None,
                    },
                ));
            }

            info!(
                migration_id = migration.id,
                name = %migration.name,
                %direction,
                "applying migration"
            );

            if let Err(err) = self.apply_one(migration, direction, cancel, applied.len()).await {
                error!(migration_id = migration.id, %direction, error = %err, "migration failed");
                return Err(RunFailure::new(RunStage::Executing, applied.len(), err));
            }

            applied.push(migration.id);
        }

        Ok(applied)
    }

    async fn apply_one(
        &self,
        migration: &Migration,
        direction: Direction,
        cancel: &CancellationToken,
        applied_so_far: usize,
    ) -> MigrationResult<()> {
        let mut tx = self
            .backend
            .begin()
            .await
            .map_err(|source| MigrationError::TransactionBegin {
                id: migration.id,
                source,
            })?;

        for statement in split_sql_statements(&migration.script) {
            debug!(migration_id = migration.id, %statement, "executing statement");
            if let Err(source) = tx.execute(&statement, &[]).await {
                let rollback = tx.rollback().await.err();
                return Err(MigrationError::StatementExecutionFailed {
                    id: migration.id,
                    name: migration.name.clone(),
                    statement,
                    source,
                    rollback,
                });
            }
        }

        if let Err(source) = self.update_ledger(&mut *tx, migration, direction).await {
            let rollback = tx.rollback().await.err();
            return Err(MigrationError::LedgerUpdateFailed {
                id: migration.id,
                source,
                rollback,
            });
        }

        // last point at which this migration can still be abandoned cleanly
        if cancel.is_cancelled() {
            let rollback = tx.rollback().await.err();
            return Err(MigrationError::Cancelled {
                applied: applied_so_far,
                rollback,
            });
        }

        tx.commit().await.map_err(|source| MigrationError::CommitFailed {
            id: migration.id,
            source,
        })?;

        debug!(migration_id = migration.id, "migration committed");
        Ok(())
    }

    async fn update_ledger(
        &self,
        tx: &mut dyn MigrationTransaction,
        migration: &Migration,
        direction: Direction,
    ) -> Result<(), sqlx::Error> {
        match direction {
            Direction::Forward => self.ledger.record(tx, migration.id, &migration.name).await,
            Direction::Reverse => self.ledger.unrecord(tx, migration.id).await,
        }
    }
}
