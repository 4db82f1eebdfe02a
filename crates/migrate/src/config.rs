//! Configuration for the migration engine and its database handle
//!
//! Both structs deserialize from YAML/JSON and are checked by a fallible
//! constructor or `validate()` before use.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::ConfigError;

/// Default run timeout, applied to the whole `run_migrations` call
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default ledger table name
pub const DEFAULT_LEDGER_TABLE: &str = "migrations";

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier pattern"))
}

/// What a run that selects no migrations reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyRunPolicy {
    /// Zero applied, reported as success
    #[default]
    Succeed,
    /// Reported as `NothingToRun`
    Fail,
}

/// Configuration for the migration engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    /// Directory holding `<id>_<name>.up.sql` / `.down.sql` pairs
    pub migrations_dir: PathBuf,
    /// Table name for the ledger of applied migrations
    pub ledger_table: String,
    /// Deadline for a whole run, in seconds; `None` disables it
    pub timeout_secs: Option<u64>,
    /// Outcome of a run with nothing to do
    pub empty_run_policy: EmptyRunPolicy,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
            empty_run_policy: EmptyRunPolicy::Succeed,
        }
    }
}

impl MigratorConfig {
    /// Create a validated configuration for `migrations_dir` with defaults
    /// for everything else
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self {
            migrations_dir: migrations_dir.into(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the ledger table name
    pub fn with_ledger_table(mut self, table: impl Into<String>) -> Self {
        self.ledger_table = table.into();
        self
    }

    /// Set the run deadline. Fractions of a second round up, so any
    /// non-zero duration stays a non-zero deadline.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_secs = timeout.map(|t| t.as_secs() + u64::from(t.subsec_nanos() > 0));
        self
    }

    /// Set the empty-run policy
    pub fn with_empty_run_policy(mut self, policy: EmptyRunPolicy) -> Self {
        self.empty_run_policy = policy;
        self
    }

    /// Run deadline as a duration
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Check every field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.migrations_dir.as_os_str().is_empty() {
            return Err(ConfigError::missing_required(
                "migrations_dir",
                "Point it at the directory containing the .up.sql/.down.sql files",
            ));
        }

        if !identifier_pattern().is_match(&self.ledger_table) {
            return Err(ConfigError::invalid_value(
                "ledger_table",
                &self.ledger_table,
                "a plain SQL identifier ([A-Za-z_][A-Za-z0-9_]*)",
            ));
        }

        if self.timeout_secs == Some(0) {
            return Err(ConfigError::invalid_value(
                "timeout_secs",
                "0",
                "a positive number of seconds, or no timeout",
            ));
        }

        Ok(())
    }
}

/// Database driver selected from the URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseDriver {
    Sqlite,
    Postgres,
}

/// Connection settings for the database handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite:...` or `postgres://...`
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
            acquire_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    /// Create a validated configuration for `url`
    pub fn new(url: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            url: url.into(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the pool size
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Driver implied by the URL scheme
    pub fn driver(&self) -> Result<DatabaseDriver, ConfigError> {
        if self.url.starts_with("sqlite:") {
            Ok(DatabaseDriver::Sqlite)
        } else if self.url.starts_with("postgres://") || self.url.starts_with("postgresql://") {
            Ok(DatabaseDriver::Postgres)
        } else {
            Err(ConfigError::UnsupportedDriver {
                url: self.url.clone(),
            })
        }
    }

    /// Check every field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::missing_required(
                "url",
                "Set DATABASE_URL or pass --database-url",
            ));
        }
        self.driver()?;

        if self.max_connections == 0 {
            return Err(ConfigError::invalid_value(
                "max_connections",
                "0",
                "a value greater than 0",
            ));
        }

        if self.acquire_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "acquire_timeout_secs",
                "0",
                "a value greater than 0",
            ));
        }

        Ok(())
    }
}
