//! Error types for the migration engine
//!
//! Every failure the engine can produce is a tagged variant carrying the
//! migration, file, or stage it happened in. Compound failures (a statement
//! error followed by a failed rollback) keep both causes.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::migrations::definitions::Direction;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Errors raised while loading, resolving, or applying migrations
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("database is not connected: {reason}")]
    NotConnected { reason: String },

    #[error("step count cannot be negative, got {steps}")]
    InvalidStepCount { steps: i64 },

    #[error("malformed migration filename {}: {reason}", path.display())]
    MalformedFilename { path: PathBuf, reason: String },

    #[error("duplicate migration id {id}: {} and {}", first.display(), second.display())]
    DuplicateMigrationId {
        id: i64,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("missing counterpart migration file {}", path.display())]
    MissingCounterpart {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("migration file is empty: {}", path.display())]
    EmptyMigrationFile { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to initialize ledger table: {source}")]
    LedgerTable {
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to query ledger: {source}")]
    LedgerQuery {
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to start transaction for migration {id}: {source}")]
    TransactionBegin {
        id: i64,
        #[source]
        source: sqlx::Error,
    },

    #[error(
        "migration {id} ({name}) failed executing `{statement}`: {source}{}",
        RollbackNote(rollback.as_ref())
    )]
    StatementExecutionFailed {
        id: i64,
        name: String,
        statement: String,
        #[source]
        source: sqlx::Error,
        rollback: Option<sqlx::Error>,
    },

    #[error("failed to update ledger for migration {id}: {source}{}", RollbackNote(rollback.as_ref()))]
    LedgerUpdateFailed {
        id: i64,
        #[source]
        source: sqlx::Error,
        rollback: Option<sqlx::Error>,
    },

    #[error("failed to commit migration {id}: {source}")]
    CommitFailed {
        id: i64,
        #[source]
        source: sqlx::Error,
    },

    #[error("migration run cancelled after {applied} migration(s){}", RollbackNote(rollback.as_ref()))]
    Cancelled {
        applied: usize,
        rollback: Option<sqlx::Error>,
    },

    #[error("no {direction} migrations to run")]
    NothingToRun { direction: Direction },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MigrationError {
    /// The rollback failure attached to a failed migration, if any
    pub fn rollback_error(&self) -> Option<&sqlx::Error> {
        match self {
            MigrationError::StatementExecutionFailed { rollback, .. }
            | MigrationError::LedgerUpdateFailed { rollback, .. }
            | MigrationError::Cancelled { rollback, .. } => rollback.as_ref(),
            _ => None,
        }
    }

    /// Id of the migration the error belongs to, when it belongs to one
    pub fn migration_id(&self) -> Option<i64> {
        match self {
            MigrationError::DuplicateMigrationId { id, .. }
            | MigrationError::TransactionBegin { id, .. }
            | MigrationError::StatementExecutionFailed { id, .. }
            | MigrationError::LedgerUpdateFailed { id, .. }
            | MigrationError::CommitFailed { id, .. } => Some(*id),
            _ => None,
        }
    }
}

struct RollbackNote<'a>(Option<&'a sqlx::Error>);

impl fmt::Display for RollbackNote<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(err) => write!(f, "; additionally rollback failed: {}", err),
            None => Ok(()),
        }
    }
}

/// Stage of a run in which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Connecting,
    EnsuringTable,
    Loading,
    Executing,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            RunStage::Connecting => "connecting",
            RunStage::EnsuringTable => "ensuring ledger table",
            RunStage::Loading => "loading migrations",
            RunStage::Executing => "executing migrations",
        };
        f.write_str(stage)
    }
}

/// A failed run: the stage it stopped in, how many migrations were
/// committed before the failure, and the cause.
#[derive(Debug, Error)]
#[error("migration run failed while {stage} after {applied} applied: {error}")]
pub struct RunFailure {
    pub stage: RunStage,
    pub applied: usize,
    #[source]
    pub error: MigrationError,
}

impl RunFailure {
    pub fn new(stage: RunStage, applied: usize, error: MigrationError) -> Self {
        Self {
            stage,
            applied,
            error,
        }
    }
}

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Unsupported database driver in url '{url}'")]
    UnsupportedDriver { url: String },
}

impl ConfigError {
    /// Create a missing required field error
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }
}
