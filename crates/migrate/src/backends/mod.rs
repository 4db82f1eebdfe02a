//! Database backends
//!
//! Opening and closing the handle belongs here, not to the engine: the
//! engine only receives something that implements [`MigrationBackend`].

pub mod core;
pub mod postgres;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod scripted;

pub use self::core::{MigrationBackend, MigrationTransaction, SqlDialect, SqlParam};
pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;

use std::sync::Arc;
use tracing::info;

use crate::config::{DatabaseConfig, DatabaseDriver};
use crate::error::{MigrationError, MigrationResult};

/// Open a database handle for the driver named by `config.url`
pub async fn connect(config: &DatabaseConfig) -> MigrationResult<Arc<dyn MigrationBackend>> {
    config.validate()?;

    let backend: Arc<dyn MigrationBackend> = match config.driver()? {
        DatabaseDriver::Sqlite => Arc::new(SqliteBackend::connect(config).await.map_err(not_connected)?),
        DatabaseDriver::Postgres => Arc::new(PostgresBackend::connect(config).await.map_err(not_connected)?),
    };

    info!(dialect = ?backend.dialect(), "database connected");
    Ok(backend)
}

/// Close a handle opened with [`connect`]
pub async fn disconnect(backend: &dyn MigrationBackend) {
    backend.close().await;
    info!("database disconnected");
}

fn not_connected(err: sqlx::Error) -> MigrationError {
    MigrationError::NotConnected {
        reason: err.to_string(),
    }
}
