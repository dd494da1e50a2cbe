//! Periodic backup snapshots.
//!
//! Every n-th successful append writes the pre-append collection to
//! `backups/claims_backup_<unix millis>_<record count>.json`. Backups are
//! created with `create_new` and never rewritten.

use crate::error::{CoreError, CoreResult};
use crate::types::Collection;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const BACKUP_PREFIX: &str = "claims_backup_";
const BACKUP_SUFFIX: &str = ".json";

/// Metadata about a backup file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    /// Full path of the backup file.
    pub path: PathBuf,
    /// When the backup was taken (Unix timestamp in milliseconds).
    pub timestamp: u64,
    /// Number of records in the backed up collection.
    pub record_count: u64,
    /// Size of the file in bytes.
    pub size: u64,
}

/// Writes and enumerates backups for one store directory.
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    interval: u64,
}

impl BackupManager {
    /// Creates a backup manager writing into `dir` every `interval` appends.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, interval: u64) -> Self {
        Self {
            dir: dir.into(),
            interval,
        }
    }

    /// Returns the backup directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether the `append_number`-th append (1-based) takes a backup.
    #[must_use]
    pub fn is_due(&self, append_number: u64) -> bool {
        self.interval > 0 && append_number > 0 && append_number % self.interval == 0
    }

    /// Writes `collection` as a new immutable backup.
    pub fn write_backup(&self, collection: &Collection, timestamp: u64) -> CoreResult<PathBuf> {
        let name = format!(
            "{BACKUP_PREFIX}{timestamp}_{:06}{BACKUP_SUFFIX}",
            collection.len()
        );
        let path = self.dir.join(name);

        let data = serde_json::to_vec_pretty(collection)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(&data)?;
        file.sync_all()?;

        Ok(path)
    }

    /// Lists backups, oldest first.
    pub fn list(&self) -> CoreResult<Vec<BackupInfo>> {
        let mut backups = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some((timestamp, record_count)) = name.to_str().and_then(parse_backup_name) else {
                continue;
            };
            backups.push(BackupInfo {
                path: entry.path(),
                timestamp,
                record_count,
                size: entry.metadata()?.len(),
            });
        }

        backups.sort_by_key(|b| (b.timestamp, b.record_count));
        Ok(backups)
    }

    /// Reads a backup file back into a collection.
    pub fn read_backup(path: &Path) -> CoreResult<Collection> {
        let data = fs::read(path)?;
        serde_json::from_slice(&data).map_err(|e| {
            CoreError::corrupt_snapshot(format!("backup {}: {e}", path.display()))
        })
    }
}

/// Parses `claims_backup_<millis>_<count>.json`.
fn parse_backup_name(name: &str) -> Option<(u64, u64)> {
    let stem = name
        .strip_prefix(BACKUP_PREFIX)?
        .strip_suffix(BACKUP_SUFFIX)?;
    let (timestamp, count) = stem.split_once('_')?;
    Some((timestamp.parse().ok()?, count.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    #[test]
    fn due_every_interval() {
        let manager = BackupManager::new("unused", 10);
        let due: Vec<u64> = (1..=30).filter(|n| manager.is_due(*n)).collect();
        assert_eq!(due, vec![10, 20, 30]);
    }

    #[test]
    fn zero_interval_disables_backups() {
        let manager = BackupManager::new("unused", 0);
        assert!(!(1..=100).any(|n| manager.is_due(n)));
    }

    #[test]
    fn write_list_read() {
        let temp = tempdir().unwrap();
        let manager = BackupManager::new(temp.path(), 10);
        let collection = Collection::empty(Utc::now());

        let path = manager.write_backup(&collection, 1_700_000_000_000).unwrap();
        let listed = manager.list().unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, path);
        assert_eq!(listed[0].timestamp, 1_700_000_000_000);
        assert_eq!(listed[0].record_count, 0);
        assert_eq!(BackupManager::read_backup(&path).unwrap(), collection);
    }

    #[test]
    fn backups_are_never_overwritten() {
        let temp = tempdir().unwrap();
        let manager = BackupManager::new(temp.path(), 10);
        let collection = Collection::empty(Utc::now());

        manager.write_backup(&collection, 5).unwrap();
        let second = manager.write_backup(&collection, 5);
        assert!(matches!(second, Err(CoreError::Io(_))));
    }

    #[test]
    fn unrelated_files_ignored() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("notes.txt"), b"x").unwrap();
        fs::write(temp.path().join("claims_backup_abc.json"), b"x").unwrap();

        let manager = BackupManager::new(temp.path(), 10);
        assert!(manager.list().unwrap().is_empty());
    }
}
