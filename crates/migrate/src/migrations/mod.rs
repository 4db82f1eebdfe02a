//! Migration System
//!
//! Loader, version ledger, step resolver and transactional executor, tied
//! together by [`engine::Migrator`].

pub mod definitions;
pub mod engine;
pub mod executor;
pub mod ledger;
pub mod loader;
pub mod resolver;
pub mod statements;
pub mod status;

pub use definitions::*;
pub use engine::Migrator;
pub use executor::MigrationExecutor;
pub use ledger::Ledger;
pub use loader::{parse_migration_stem, MigrationFile, MigrationLoader};
pub use resolver::{resolve_steps, StepRange};
pub use statements::split_sql_statements;
