//! Migration Definitions - Core types for the migration engine
//!
//! Defines Migration, Direction, LedgerEntry, MigrationSet and the result
//! types reported back to callers.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One migration script for one direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    /// Positive numeric id parsed from the filename prefix
    pub id: i64,
    /// Filename without the id prefix and direction suffix
    pub name: String,
    /// SQL text for the direction this migration was loaded for
    pub script: String,
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Apply the migration (run `.up.sql`)
    #[serde(rename = "up")]
    Forward,
    /// Roll the migration back (run `.down.sql`)
    #[serde(rename = "down")]
    Reverse,
}

impl Direction {
    /// File suffix component for this direction
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "up",
            Direction::Reverse => "down",
        }
    }

    /// The other direction
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }

    /// `.up.sql` / `.down.sql`
    pub fn file_suffix(&self) -> String {
        format!(".{}.sql", self.as_str())
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" | "forward" => Ok(Direction::Forward),
            "down" | "reverse" => Ok(Direction::Reverse),
            other => Err(format!("unknown migration direction '{}'", other)),
        }
    }
}

/// A row of the ledger table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub name: String,
    pub applied_at: NaiveDateTime,
}

/// Migrations selected for one run, already in execution order:
/// ascending ids for Forward, descending for Reverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSet {
    direction: Direction,
    migrations: Vec<Migration>,
}

impl MigrationSet {
    /// Build a set, sorting the migrations into execution order
    pub fn new(direction: Direction, mut migrations: Vec<Migration>) -> Self {
        match direction {
            Direction::Forward => migrations.sort_by_key(|m| m.id),
            Direction::Reverse => migrations.sort_by(|a, b| b.id.cmp(&a.id)),
        }
        Self {
            direction,
            migrations,
        }
    }

    pub fn empty(direction: Direction) -> Self {
        Self {
            direction,
            migrations: Vec::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.migrations.iter().map(|m| m.id).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Migration> {
        self.migrations.iter()
    }
}

impl<'a> IntoIterator for &'a MigrationSet {
    type Item = &'a Migration;
    type IntoIter = std::slice::Iter<'a, Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.migrations.iter()
    }
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRunResult {
    /// Direction the run moved in
    pub direction: Direction,
    /// Number of migrations that were applied (or unapplied)
    pub applied_count: usize,
    /// Ids in the order they were executed
    pub applied_ids: Vec<i64>,
    /// Ledger version before the run
    pub version_before: i64,
    /// Ledger version after the run
    pub version_after: i64,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Applied/pending state of one migration on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub id: i64,
    pub name: String,
    /// When it was applied, `None` while pending
    pub applied_at: Option<NaiveDateTime>,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Status of all migrations known to the directory and the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Current ledger version
    pub version: i64,
    /// One entry per up-script, ascending by id
    pub migrations: Vec<MigrationStatus>,
    /// Ledger rows with no up-script on disk
    pub orphaned: Vec<LedgerEntry>,
}

impl StatusReport {
    pub fn pending(&self) -> impl Iterator<Item = &MigrationStatus> {
        self.migrations.iter().filter(|m| !m.is_applied())
    }
}
