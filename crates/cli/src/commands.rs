//! Command implementations and their terminal output

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::sync::Arc;

use sqlsteps_migrate::backends::{self, MigrationBackend};
use sqlsteps_migrate::{Direction, MigrationRunResult, Migrator, RunFailure, StatusReport};

use crate::settings::Settings;

/// Open the database, run `f` against a migrator, and always disconnect
async fn with_migrator<T, F, Fut>(settings: &Settings, f: F) -> Result<T>
where
    F: FnOnce(Migrator) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let backend: Arc<dyn MigrationBackend> = backends::connect(&settings.database)
        .await
        .context("failed to open database")?;

    let result = match Migrator::new(backend.clone(), settings.migrator.clone()) {
        Ok(migrator) => f(migrator).await,
        Err(err) => Err(err.into()),
    };

    backends::disconnect(backend.as_ref()).await;
    result
}

/// `up` / `down`. Returns `false` when the run failed.
pub async fn run(settings: &Settings, direction: Direction, steps: i64) -> Result<bool> {
    with_migrator(settings, |migrator| async move {
        match migrator.run_migrations(steps, direction).await {
            Ok(result) => {
                println!("{}", format_run_result(&result));
                Ok::<_, anyhow::Error>(true)
            }
            Err(failure) => {
                eprintln!("{}", format_failure(&failure));
                Ok(false)
            }
        }
    })
    .await
}

/// `version`
pub async fn version(settings: &Settings) -> Result<()> {
    with_migrator(settings, |migrator| async move {
        let version = migrator.version().await.context("failed to read version")?;
        println!("{}", version);
        Ok::<_, anyhow::Error>(())
    })
    .await
}

/// `status`
pub async fn status(settings: &Settings, json: bool) -> Result<()> {
    with_migrator(settings, |migrator| async move {
        let report = migrator.status().await.context("failed to read migration status")?;
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", render_status(&report));
        }
        Ok::<_, anyhow::Error>(())
    })
    .await
}

pub fn format_run_result(result: &MigrationRunResult) -> String {
    format!(
        "applied {} migration(s), version {} -> {}",
        result.applied_count, result.version_before, result.version_after
    )
}

pub fn format_failure(failure: &RunFailure) -> String {
    format!(
        "applied {}, then failed during {}: {}",
        failure.applied, failure.stage, failure.error
    )
}

pub fn render_status(report: &StatusReport) -> String {
    let name_width = report
        .migrations
        .iter()
        .map(|m| m.name.len())
        .chain(report.orphaned.iter().map(|e| e.name.len()))
        .max()
        .unwrap_or(0)
        .max(4);

    let mut out = String::new();
    let _ = writeln!(out, "{:<6} {:<name_width$} {:<8} APPLIED AT", "ID", "NAME", "STATUS");
    for migration in &report.migrations {
        let (state, applied_at) = match migration.applied_at {
            Some(at) => ("applied", at.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => ("pending", "-".to_string()),
        };
        let _ = writeln!(
            out,
            "{:<6} {:<name_width$} {:<8} {}",
            migration.id, migration.name, state, applied_at
        );
    }

    if !report.orphaned.is_empty() {
        let _ = writeln!(out, "\nLedger rows without a migration file:");
        for entry in &report.orphaned {
            let _ = writeln!(
                out,
                "{:<6} {:<name_width$} {:<8} {}",
                entry.id,
                entry.name,
                "orphaned",
                entry.applied_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    let _ = writeln!(out, "\nversion: {}", report.version);
    out
}
