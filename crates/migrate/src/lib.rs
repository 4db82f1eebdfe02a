//! # sqlsteps-migrate: bidirectional SQL migrations
//!
//! Applies numbered `<id>_<name>.up.sql` / `<id>_<name>.down.sql` scripts
//! against a relational database, one transaction per migration, and keeps
//! a ledger table whose highest id is the schema version.
//!
//! ```no_run
//! use sqlsteps_migrate::{backends, Direction, DatabaseConfig, Migrator, MigratorConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = backends::connect(&DatabaseConfig::new("sqlite:app.db")?).await?;
//! let migrator = Migrator::new(backend.clone(), MigratorConfig::new("migrations")?)?;
//!
//! let result = migrator.run_migrations(0, Direction::Forward).await?;
//! println!("applied {}, now at {}", result.applied_count, migrator.version().await?);
//!
//! backends::disconnect(backend.as_ref()).await;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod migrations;

pub use backends::{MigrationBackend, MigrationTransaction, SqlDialect};
pub use config::{DatabaseConfig, DatabaseDriver, EmptyRunPolicy, MigratorConfig};
pub use error::{ConfigError, MigrationError, MigrationResult, RunFailure, RunStage};
pub use migrations::{
    Direction, LedgerEntry, Migration, MigrationRunResult, MigrationSet, MigrationStatus, Migrator,
    StatusReport,
};
