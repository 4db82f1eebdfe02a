//! Migration Source Loader - file system side of the engine
//!
//! Scans a migrations directory for `<id>_<name>.<direction>.sql` scripts,
//! validates that every selected script has a non-empty counterpart in the
//! opposite direction, and returns the selected scripts in execution order.

use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::definitions::{Direction, Migration, MigrationSet};
use super::resolver::resolve_steps;
use super::statements::unterminated_tail;
use crate::error::{MigrationError, MigrationResult};

fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?P<id>[^_]*)_(?P<name>.*)$").expect("valid filename pattern"))
}

/// A migration script found on disk, not yet read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub id: i64,
    pub name: String,
    pub path: PathBuf,
}

impl MigrationFile {
    /// Filename stem shared by both directions (`0001_create_systems`)
    pub fn stem(&self, direction: Direction) -> String {
        let suffix = direction.file_suffix();
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|name| name.strip_suffix(&suffix).unwrap_or(name).to_string())
            .unwrap_or_default()
    }
}

/// Parse `<id>_<name>` (direction suffix already stripped) into id and name
pub fn parse_migration_stem(path: &Path, stem: &str) -> MigrationResult<(i64, String)> {
    let malformed = |reason: &str| MigrationError::MalformedFilename {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let captures = filename_pattern()
        .captures(stem)
        .ok_or_else(|| malformed("expected <id>_<name>"))?;

    let id_part = &captures["id"];
    if id_part.is_empty() || !id_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed("id is not an integer"));
    }
    let id: i64 = id_part
        .parse()
        .map_err(|_| malformed("id is out of range"))?;
    if id == 0 {
        return Err(malformed("id cannot be 0"));
    }

    let name = captures["name"].to_string();
    if name.is_empty() {
        return Err(malformed("name is empty"));
    }

    Ok((id, name))
}

/// Loader for migration scripts in one directory
#[derive(Debug, Clone)]
pub struct MigrationLoader {
    dir: PathBuf,
}

impl MigrationLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List every script for `direction`, ascending by id.
    ///
    /// Every matching filename must parse, even ids outside the range a
    /// later load will select. A missing directory yields no scripts.
    pub fn scan(&self, direction: Direction) -> MigrationResult<Vec<MigrationFile>> {
        if !self.dir.exists() {
            warn!(dir = %self.dir.display(), "migrations directory does not exist");
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|source| MigrationError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let suffix = direction.file_suffix();
        let mut files: BTreeMap<i64, MigrationFile> = BTreeMap::new();

        for entry in entries {
            let entry = entry.map_err(|source| MigrationError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let raw_name = entry.file_name();
            let Some(file_name) = raw_name.to_str() else {
                if raw_name.to_string_lossy().ends_with(&suffix) {
                    return Err(MigrationError::MalformedFilename {
                        path,
                        reason: "filename is not valid UTF-8".to_string(),
                    });
                }
                continue;
            };
            let Some(stem) = file_name.strip_suffix(&suffix) else {
                continue;
            };

            let (id, name) = parse_migration_stem(&path, stem)?;
            if let Some(existing) = files.get(&id) {
                return Err(MigrationError::DuplicateMigrationId {
                    id,
                    first: existing.path.clone(),
                    second: path,
                });
            }
            files.insert(id, MigrationFile { id, name, path });
        }

        Ok(files.into_values().collect())
    }

    /// Select and read the scripts for one run.
    ///
    /// `steps == 0` selects everything pending (Forward) or everything
    /// applied (Reverse). An empty set is a valid result.
    pub fn load(&self, direction: Direction, steps: i64, last_applied: i64) -> MigrationResult<MigrationSet> {
        if steps < 0 {
            return Err(MigrationError::InvalidStepCount { steps });
        }

        let files = self.scan(direction)?;
        let max_available = files.last().map(|f| f.id).unwrap_or(0);

        let Some(range) = resolve_steps(direction, steps, last_applied, max_available)? else {
            debug!(%direction, steps, last_applied, max_available, "no migrations in range");
            return Ok(MigrationSet::empty(direction));
        };

        debug!(%direction, from = range.from, to = range.to, "resolved migration range");

        let mut migrations = Vec::new();
        for file in files.into_iter().filter(|f| range.contains(f.id)) {
            let script = read_script(&file.path)?;
            if let Some(tail) = unterminated_tail(&script) {
                warn!(
                    path = %file.path.display(),
                    tail,
                    "content after the last ';' will not be executed"
                );
            }

            let counterpart = self
                .dir
                .join(format!("{}{}", file.stem(direction), direction.opposite().file_suffix()));
            self.check_counterpart(&counterpart)?;

            migrations.push(Migration {
                id: file.id,
                name: file.name,
                script,
            });
        }

        Ok(MigrationSet::new(direction, migrations))
    }

    fn check_counterpart(&self, path: &Path) -> MigrationResult<()> {
        let content = fs::read(path).map_err(|source| MigrationError::MissingCounterpart {
            path: path.to_path_buf(),
            source: Some(source),
        })?;
        if content.is_empty() {
            return Err(MigrationError::EmptyMigrationFile {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }
}

fn read_script(path: &Path) -> MigrationResult<String> {
    let content = fs::read_to_string(path).map_err(|source| MigrationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if content.is_empty() {
        return Err(MigrationError::EmptyMigrationFile {
            path: path.to_path_buf(),
        });
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_pair(dir: &TempDir, stem: &str, up: &str, down: &str) {
        fs::write(dir.path().join(format!("{}.up.sql", stem)), up).unwrap();
        fs::write(dir.path().join(format!("{}.down.sql", stem)), down).unwrap();
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_pair(&dir, "0001_create_systems", "CREATE TABLE systems (id INTEGER);", "DROP TABLE systems;");
        write_pair(
            &dir,
            "0002_add_flag",
            "ALTER TABLE systems ADD COLUMN flag INTEGER;",
            "ALTER TABLE systems DROP COLUMN flag;",
        );
        write_pair(&dir, "0003_create_users", "CREATE TABLE users (id INTEGER);", "DROP TABLE users;");
        dir
    }

    #[test]
    fn test_parse_stem() {
        let path = Path::new("0001_create_systems.up.sql");
        assert_eq!(
            parse_migration_stem(path, "0001_create_systems").unwrap(),
            (1, "create_systems".to_string())
        );
        assert_eq!(parse_migration_stem(path, "12_a_b_c").unwrap(), (12, "a_b_c".to_string()));
    }

    #[test]
    fn test_parse_stem_rejects_malformed() {
        let path = Path::new("x");
        for stem in ["create_systems", "0001", "0_zero", "-1_negative", "_name", "7_", "1e3_x"] {
            let err = parse_migration_stem(path, stem).unwrap_err();
            assert!(
                matches!(err, MigrationError::MalformedFilename { .. }),
                "expected malformed for {}",
                stem
            );
        }
    }

    #[test]
    fn test_scan_orders_and_filters_by_direction() {
        let dir = fixture();
        fs::write(dir.path().join("README.md"), "notes").unwrap();
        fs::create_dir(dir.path().join("0009_nested.up.sql")).unwrap();

        let loader = MigrationLoader::new(dir.path());
        let files = loader.scan(Direction::Forward).unwrap();
        assert_eq!(files.iter().map(|f| f.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(files[0].name, "create_systems");
        assert_eq!(files[0].stem(Direction::Forward), "0001_create_systems");
    }

    #[test]
    fn test_load_forward_all() {
        let dir = fixture();
        let set = MigrationLoader::new(dir.path()).load(Direction::Forward, 0, 0).unwrap();
        assert_eq!(set.ids(), vec![1, 2, 3]);
        assert_eq!(set.direction(), Direction::Forward);
        let first = set.iter().next().unwrap();
        assert_eq!(first.script, "CREATE TABLE systems (id INTEGER);");
    }

    #[test]
    fn test_load_reverse_is_descending() {
        let dir = fixture();
        let set = MigrationLoader::new(dir.path()).load(Direction::Reverse, 0, 3).unwrap();
        assert_eq!(set.ids(), vec![3, 2, 1]);
        assert_eq!(set.iter().next().unwrap().script, "DROP TABLE users;");
    }

    #[test]
    fn test_load_steps_and_clamping() {
        let dir = fixture();
        let loader = MigrationLoader::new(dir.path());
        assert_eq!(loader.load(Direction::Forward, 1, 1).unwrap().ids(), vec![2]);
        assert_eq!(loader.load(Direction::Forward, 50, 1).unwrap().ids(), vec![2, 3]);
        assert_eq!(loader.load(Direction::Reverse, 1, 2).unwrap().ids(), vec![2]);
        assert!(loader.load(Direction::Forward, 0, 3).unwrap().is_empty());
        assert!(loader.load(Direction::Reverse, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_load_negative_steps() {
        let dir = fixture();
        let err = MigrationLoader::new(dir.path()).load(Direction::Forward, -2, 0).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidStepCount { steps: -2 }));
    }

    #[test]
    fn test_missing_counterpart() {
        let dir = fixture();
        fs::write(dir.path().join("0004_orphan.up.sql"), "CREATE TABLE orphan (id INTEGER);").unwrap();

        let loader = MigrationLoader::new(dir.path());
        let err = loader.load(Direction::Forward, 0, 3).unwrap_err();
        match err {
            MigrationError::MissingCounterpart { path, .. } => {
                assert!(path.ends_with("0004_orphan.down.sql"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // out of range candidates are not checked
        assert!(loader.load(Direction::Forward, 0, 0).is_err());
        assert_eq!(loader.load(Direction::Forward, 2, 0).unwrap().ids(), vec![1, 2]);
    }

    #[test]
    fn test_empty_script_and_empty_counterpart() {
        let dir = fixture();
        write_pair(&dir, "0004_empty_up", "", "DROP TABLE x;");
        let loader = MigrationLoader::new(dir.path());
        let err = loader.load(Direction::Forward, 0, 3).unwrap_err();
        assert!(matches!(err, MigrationError::EmptyMigrationFile { ref path } if path.ends_with("0004_empty_up.up.sql")));

        let dir = fixture();
        write_pair(&dir, "0004_empty_down", "CREATE TABLE x (id INTEGER);", "");
        let loader = MigrationLoader::new(dir.path());
        let err = loader.load(Direction::Forward, 0, 3).unwrap_err();
        assert!(matches!(err, MigrationError::EmptyMigrationFile { ref path } if path.ends_with("0004_empty_down.down.sql")));
    }

    #[test]
    fn test_malformed_filename_anywhere_fails() {
        let dir = fixture();
        fs::write(dir.path().join("latest.up.sql"), "SELECT 1;").unwrap();
        let err = MigrationLoader::new(dir.path()).load(Direction::Forward, 1, 0).unwrap_err();
        assert!(matches!(err, MigrationError::MalformedFilename { .. }));
    }

    #[test]
    fn test_duplicate_ids() {
        let dir = fixture();
        write_pair(&dir, "2_other_flag", "SELECT 1;", "SELECT 1;");
        let err = MigrationLoader::new(dir.path()).scan(Direction::Forward).unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateMigrationId { id: 2, .. }));
    }

    #[test]
    fn test_gaps_are_tolerated() {
        let dir = TempDir::new().unwrap();
        write_pair(&dir, "1_first", "SELECT 1;", "SELECT 1;");
        write_pair(&dir, "5_fifth", "SELECT 5;", "SELECT 5;");
        let set = MigrationLoader::new(dir.path()).load(Direction::Forward, 0, 0).unwrap();
        assert_eq!(set.ids(), vec![1, 5]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let loader = MigrationLoader::new(dir.path().join("nope"));
        assert!(loader.load(Direction::Forward, 0, 0).unwrap().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_filename_is_malformed() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = fixture();
        let name = OsStr::from_bytes(b"0004_caf\xe9.up.sql");
        fs::write(dir.path().join(name), "SELECT 1;").unwrap();

        let err = MigrationLoader::new(dir.path()).load(Direction::Forward, 0, 0).unwrap_err();
        match err {
            MigrationError::MalformedFilename { reason, .. } => assert!(reason.contains("UTF-8")),
            other => panic!("unexpected error: {other}"),
        }

        // other non-UTF-8 names in the directory are ignored
        let dir = fixture();
        fs::write(dir.path().join(OsStr::from_bytes(b"notes\xe9.txt")), "x").unwrap();
        assert_eq!(
            MigrationLoader::new(dir.path()).load(Direction::Forward, 0, 0).unwrap().ids(),
            vec![1, 2, 3]
        );
    }
}
