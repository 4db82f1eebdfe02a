//! Migration status - joins the scripts on disk with the ledger rows

use std::collections::BTreeMap;

use super::definitions::{LedgerEntry, MigrationStatus, StatusReport};
use super::loader::MigrationFile;

/// Build a report from the up-scripts on disk and the ledger contents.
///
/// Ledger rows without an up-script are reported as orphaned rather than
/// dropped.
pub fn build_status_report(version: i64, up_files: Vec<MigrationFile>, entries: Vec<LedgerEntry>) -> StatusReport {
    let mut applied: BTreeMap<i64, LedgerEntry> = entries.into_iter().map(|e| (e.id, e)).collect();

    let migrations = up_files
        .into_iter()
        .map(|file| MigrationStatus {
            id: file.id,
            applied_at: applied.remove(&file.id).map(|entry| entry.applied_at),
            name: file.name,
        })
        .collect();

    StatusReport {
        version,
        migrations,
        orphaned: applied.into_values().collect(),
    }
}
