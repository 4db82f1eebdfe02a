//! CLI settings: optional YAML file, overlaid by flags and environment

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use sqlsteps_migrate::{DatabaseConfig, MigratorConfig};

/// Layout of the `--config` YAML file
///
/// ```yaml
/// database:
///   url: sqlite:app.db
///   max_connections: 1
/// migrator:
///   migrations_dir: db/migrations
///   timeout_secs: 30
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub database: DatabaseConfig,
    pub migrator: MigratorConfig,
}

impl FileSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

/// Values given on the command line or through the environment
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub migrations_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// Validated settings for one invocation
#[derive(Debug)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub migrator: MigratorConfig,
}

impl Settings {
    /// Read `config_file` if given, then apply `overrides` on top
    pub fn resolve(config_file: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut file = match config_file {
            Some(path) => FileSettings::load(path)?,
            None => FileSettings::default(),
        };

        if let Some(url) = overrides.database_url {
            file.database.url = url;
        }
        if let Some(dir) = overrides.migrations_dir {
            file.migrator.migrations_dir = dir;
        }
        match overrides.timeout_secs {
            Some(0) => file.migrator.timeout_secs = None,
            Some(secs) => file.migrator.timeout_secs = Some(secs),
            None => {}
        }

        file.database.validate().context("invalid database settings")?;
        file.migrator.validate().context("invalid migrator settings")?;

        Ok(Self {
            database: file.database,
            migrator: file.migrator,
        })
    }
}
