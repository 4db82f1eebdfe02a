//! Migration engine facade
//!
//! Ties the loader, ledger and executor to one database handle. The handle
//! is opened and closed by the caller; the engine only borrows it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::definitions::{Direction, MigrationRunResult, StatusReport};
use super::executor::MigrationExecutor;
use super::ledger::Ledger;
use super::loader::MigrationLoader;
use super::status::build_status_report;
use crate::backends::MigrationBackend;
use crate::config::{EmptyRunPolicy, MigratorConfig};
use crate::error::{MigrationError, MigrationResult, RunFailure, RunStage};

/// Bidirectional migration runner bound to a database handle
pub struct Migrator {
    backend: Arc<dyn MigrationBackend>,
    config: MigratorConfig,
    ledger: Ledger,
    loader: MigrationLoader,
}

impl Migrator {
    /// Create a migrator. Fails if `config` does not validate.
    pub fn new(backend: Arc<dyn MigrationBackend>, config: MigratorConfig) -> MigrationResult<Self> {
        config.validate()?;

        let ledger = Ledger::new(config.ledger_table.clone(), backend.dialect());
        let loader = MigrationLoader::new(config.migrations_dir.clone());

        Ok(Self {
            backend,
            config,
            ledger,
            loader,
        })
    }

    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn loader(&self) -> &MigrationLoader {
        &self.loader
    }

    /// Apply `steps` migrations in `direction`; `0` means all of them.
    ///
    /// Bounded by the configured timeout, if any.
    pub async fn run_migrations(&self, steps: i64, direction: Direction) -> Result<MigrationRunResult, RunFailure> {
        self.run_migrations_with_cancel(steps, direction, CancellationToken::new())
            .await
    }

    /// Like [`Migrator::run_migrations`], stopping early once `cancel` fires.
    ///
    /// Cancellation is checked before each migration and again before each
    /// commit, so the migration in flight is rolled back and everything
    /// committed before it stays.
    #[instrument(skip(self, cancel), fields(dir = %self.config.migrations_dir.display()))]
    pub async fn run_migrations_with_cancel(
        &self,
        steps: i64,
        direction: Direction,
        cancel: CancellationToken,
    ) -> Result<MigrationRunResult, RunFailure> {
        let token = cancel.child_token();

        match self.config.timeout() {
            Some(timeout) => self.run_with_deadline(steps, direction, &token, timeout).await,
            None => self.run(steps, direction, &token).await,
        }
    }

    async fn run_with_deadline(
        &self,
        steps: i64,
        direction: Direction,
        token: &CancellationToken,
        timeout: Duration,
    ) -> Result<MigrationRunResult, RunFailure> {
        let run = self.run(steps, direction, token);
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => result,
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout_secs = timeout.as_secs(), "migration run deadline reached, cancelling");
                token.cancel();
                run.await
            }
        }
    }

    async fn run(
        &self,
        steps: i64,
        direction: Direction,
        cancel: &CancellationToken,
    ) -> Result<MigrationRunResult, RunFailure> {
        let start_time = Instant::now();

        if steps < 0 {
            return Err(RunFailure::new(
                RunStage::Loading,
                0,
                MigrationError::InvalidStepCount { steps },
            ));
        }

        self.ensure_connected()
            .await
            .map_err(|err| RunFailure::new(RunStage::Connecting, 0, err))?;

        self.ledger
            .ensure_table(self.backend.as_ref())
            .await
            .map_err(|err| RunFailure::new(RunStage::EnsuringTable, 0, err))?;

        let version_before = self
            .ledger
            .last_applied_id(self.backend.as_ref())
            .await
            .map_err(|err| RunFailure::new(RunStage::Loading, 0, err))?;

        let set = self
            .loader
            .load(direction, steps, version_before)
            .map_err(|err| RunFailure::new(RunStage::Loading, 0, err))?;

        if set.is_empty() {
            info!(%direction, version = version_before, "no migrations to run");
            if self.config.empty_run_policy == EmptyRunPolicy::Fail {
                return Err(RunFailure::new(
                    RunStage::Loading,
                    0,
                    MigrationError::NothingToRun { direction },
                ));
            }
            return Ok(MigrationRunResult {
                direction,
                applied_count: 0,
                applied_ids: Vec::new(),
                version_before,
                version_after: version_before,
                execution_time_ms: start_time.elapsed().as_millis(),
            });
        }

        info!(%direction, count = set.len(), version = version_before, "running migrations");

        let executor = MigrationExecutor::new(self.backend.as_ref(), &self.ledger);
        let applied_ids = executor.apply(&set, cancel).await?;

        let version_after = self
            .ledger
            .last_applied_id(self.backend.as_ref())
            .await
            .map_err(|err| RunFailure::new(RunStage::Executing, applied_ids.len(), err))?;

        let result = MigrationRunResult {
            direction,
            applied_count: applied_ids.len(),
            applied_ids,
            version_before,
            version_after,
            execution_time_ms: start_time.elapsed().as_millis(),
        };

        info!(
            %direction,
            applied = result.applied_count,
            version_before,
            version_after,
            elapsed_ms = result.execution_time_ms as u64,
            "migration run finished"
        );
        Ok(result)
    }

    /// Current schema version, 0 when no migration is applied
    pub async fn version(&self) -> MigrationResult<i64> {
        self.ensure_connected().await?;
        self.ledger.ensure_table(self.backend.as_ref()).await?;
        self.ledger.last_applied_id(self.backend.as_ref()).await
    }

    /// Applied/pending state of every up-script, plus orphaned ledger rows
    pub async fn status(&self) -> MigrationResult<StatusReport> {
        self.ensure_connected().await?;
        self.ledger.ensure_table(self.backend.as_ref()).await?;

        let version = self.ledger.last_applied_id(self.backend.as_ref()).await?;
        let entries = self.ledger.entries(self.backend.as_ref()).await?;
        let up_files = self.loader.scan(Direction::Forward)?;

        Ok(build_status_report(version, up_files, entries))
    }

    async fn ensure_connected(&self) -> MigrationResult<()> {
        self.backend
            .ping()
            .await
            .map_err(|err| MigrationError::NotConnected {
                reason: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::scripted::ScriptedBackend;
    use crate::backends::SqliteBackend;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::fs;
    use tempfile::TempDir;

    async fn memory_backend() -> Arc<dyn MigrationBackend> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Arc::new(SqliteBackend::new(pool))
    }

    fn write_pair(dir: &TempDir, stem: &str, up: &str, down: &str) {
        fs::write(dir.path().join(format!("{}.up.sql", stem)), up).unwrap();
        fs::write(dir.path().join(format!("{}.down.sql", stem)), down).unwrap();
    }

    fn systems_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_pair(
            &dir,
            "0001_create_systems",
            "CREATE TABLE systems (id INTEGER PRIMARY KEY, name TEXT NOT NULL);\n",
            "DROP TABLE systems;\n",
        );
        write_pair(
            &dir,
            "0002_add_flag",
            "ALTER TABLE systems ADD COLUMN flag INTEGER NOT NULL DEFAULT 0;\n",
            "ALTER TABLE systems DROP COLUMN flag;\n",
        );
        dir
    }

    async fn migrator(dir: &TempDir) -> Migrator {
        let config = MigratorConfig::new(dir.path()).unwrap();
        Migrator::new(memory_backend().await, config).unwrap()
    }

    #[tokio::test]
    async fn test_version_of_fresh_database_is_zero() {
        let dir = systems_dir();
        let migrator = migrator(&dir).await;
        assert_eq!(migrator.version().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_up_then_down_one() {
        let dir = systems_dir();
        let migrator = migrator(&dir).await;

        let result = migrator.run_migrations(0, Direction::Forward).await.unwrap();
        assert_eq!(result.applied_count, 2);
        assert_eq!(result.applied_ids, vec![1, 2]);
        assert_eq!(result.version_before, 0);
        assert_eq!(result.version_after, 2);
        assert_eq!(migrator.version().await.unwrap(), 2);

        let result = migrator.run_migrations(1, Direction::Reverse).await.unwrap();
        assert_eq!(result.applied_count, 1);
        assert_eq!(result.applied_ids, vec![2]);
        assert_eq!(migrator.version().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_negative_steps_rejected_before_touching_database() {
        let dir = systems_dir();
        let migrator = migrator(&dir).await;

        let failure = migrator.run_migrations(-1, Direction::Forward).await.unwrap_err();
        assert_eq!(failure.applied, 0);
        assert!(matches!(failure.error, MigrationError::InvalidStepCount { steps: -1 }));
    }

    #[tokio::test]
    async fn test_empty_run_policy() {
        let dir = systems_dir();
        let backend = memory_backend().await;

        let succeed = Migrator::new(backend.clone(), MigratorConfig::new(dir.path()).unwrap()).unwrap();
        let result = succeed.run_migrations(0, Direction::Reverse).await.unwrap();
        assert_eq!(result.applied_count, 0);
        assert_eq!(result.version_after, 0);

        let config = MigratorConfig::new(dir.path())
            .unwrap()
            .with_empty_run_policy(EmptyRunPolicy::Fail);
        let fail = Migrator::new(backend, config).unwrap();
        let failure = fail.run_migrations(0, Direction::Reverse).await.unwrap_err();
        assert_eq!(failure.stage, RunStage::Loading);
        assert!(matches!(
            failure.error,
            MigrationError::NothingToRun {
                direction: Direction::Reverse
            }
        ));
    }

    #[tokio::test]
    async fn test_closed_handle_is_not_connected() {
        let dir = systems_dir();
        let backend = memory_backend().await;
        let migrator = Migrator::new(backend.clone(), MigratorConfig::new(dir.path()).unwrap()).unwrap();

        backend.close().await;

        let failure = migrator.run_migrations(0, Direction::Forward).await.unwrap_err();
        assert_eq!(failure.stage, RunStage::Connecting);
        assert!(matches!(failure.error, MigrationError::NotConnected { .. }));
        assert!(matches!(migrator.version().await, Err(MigrationError::NotConnected { .. })));
    }

    #[tokio::test]
    async fn test_status_reports_pending_and_orphaned() {
        let dir = systems_dir();
        let migrator = migrator(&dir).await;

        migrator.run_migrations(0, Direction::Forward).await.unwrap();
        fs::remove_file(dir.path().join("0002_add_flag.up.sql")).unwrap();
        write_pair(&dir, "0003_add_owner", "ALTER TABLE systems ADD COLUMN owner TEXT;\n", "SELECT 1;\n");

        let report = migrator.status().await.unwrap();
        assert_eq!(report.version, 2);

        let ids: Vec<(i64, bool)> = report.migrations.iter().map(|m| (m.id, m.is_applied())).collect();
        assert_eq!(ids, vec![(1, true), (3, false)]);
        assert_eq!(report.orphaned.len(), 1);
        assert_eq!(report.orphaned[0].id, 2);
        assert_eq!(report.orphaned[0].name, "add_flag");
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let dir = systems_dir();
        let config = MigratorConfig::new(dir.path()).unwrap().with_ledger_table("bad name");
        assert!(matches!(
            Migrator::new(memory_backend().await, config),
            Err(MigrationError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_deadline_rolls_back_in_flight_migration() {
        let dir = TempDir::new().unwrap();
        for id in 1..=3 {
            write_pair(
                &dir,
                &format!("{:04}_create_t{}", id, id),
                &format!("CREATE TABLE t{id} (id INTEGER);\n"),
                &format!("DROP TABLE t{id};\n"),
            );
        }

        let backend = ScriptedBackend {
            slow_statement: Some(("CREATE TABLE t1", Duration::from_millis(1500))),
            ..Default::default()
        };
        let config = MigratorConfig::new(dir.path())
            .unwrap()
            .with_timeout(Some(Duration::from_secs(1)));
        let migrator = Migrator::new(Arc::new(backend.clone()), config).unwrap();

        let failure = migrator.run_migrations(0, Direction::Forward).await.unwrap_err();
        assert_eq!(failure.stage, RunStage::Executing);
        assert_eq!(failure.applied, 0);
        assert!(matches!(failure.error, MigrationError::Cancelled { applied: 0, rollback: None }));

        let journal = backend.journal.lock().unwrap();
        assert_eq!(journal.begun, 1);
        assert_eq!(journal.committed, 0);
        assert_eq!(journal.rolled_back, 1);
    }
}
