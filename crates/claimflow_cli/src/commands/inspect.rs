//! Inspect command implementation.

use super::format_timestamp;
use claimflow_core::{
    backups_dir_in, read_snapshot_file, snapshot_path_in, BackupManager, Collection,
    DEFAULT_BACKUP_INTERVAL,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Snapshot file size in bytes.
    pub snapshot_size: u64,
    /// Schema version recorded in the snapshot.
    pub version: String,
    /// When the collection was created.
    pub created_at: String,
    /// Last committed mutation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// `total_records` from the metadata.
    pub total_records: u64,
    /// Records per status label.
    pub statuses: BTreeMap<String, usize>,
    /// Backups, oldest first.
    pub backups: Vec<BackupEntry>,
    /// Files in the emergency capture directory.
    pub emergency_captures: usize,
}

/// One backup file.
#[derive(Debug, Serialize)]
pub struct BackupEntry {
    /// File name.
    pub name: String,
    /// Creation time.
    pub created: String,
    /// Records in the pre-append state it holds.
    pub record_count: u64,
    /// Size in bytes.
    pub size: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = collect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text(&result),
    }

    Ok(())
}

/// Reads the store without taking its lock.
pub fn collect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let snapshot_path = snapshot_path_in(path);
    let collection: Collection = read_snapshot_file(&snapshot_path)?
        .ok_or_else(|| format!("No claims store found at {:?}", path))?;
    let snapshot_size = fs::metadata(&snapshot_path)?.len();

    let mut statuses = BTreeMap::new();
    for claim in &collection.claims {
        *statuses.entry(claim.status.clone()).or_insert(0) += 1;
    }

    let backups = list_backups(path)?
        .into_iter()
        .map(|b| BackupEntry {
            name: b
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            created: format_timestamp(b.timestamp),
            record_count: b.record_count,
            size: b.size,
        })
        .collect();

    Ok(InspectResult {
        path: path.display().to_string(),
        snapshot_size,
        version: collection.metadata.version.clone(),
        created_at: collection.metadata.created_at.to_rfc3339(),
        last_updated: collection.metadata.last_updated.map(|t| t.to_rfc3339()),
        total_records: collection.metadata.total_records,
        statuses,
        backups,
        emergency_captures: count_files(&path.join("emergency"))?,
    })
}

/// Lists backups, treating a missing backups directory as empty.
pub(crate) fn list_backups(
    path: &Path,
) -> Result<Vec<claimflow_core::BackupInfo>, Box<dyn std::error::Error>> {
    let dir = backups_dir_in(path);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    Ok(BackupManager::new(dir, DEFAULT_BACKUP_INTERVAL).list()?)
}

fn count_files(dir: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    match fs::read_dir(dir) {
        Ok(entries) => Ok(entries.filter_map(Result::ok).count()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn print_text(result: &InspectResult) {
    println!("Claims store: {}", result.path);
    println!();
    println!("Snapshot:");
    println!("  Size: {} bytes", result.snapshot_size);
    println!("  Schema version: {}", result.version);
    println!("  Created: {}", result.created_at);
    if let Some(updated) = &result.last_updated {
        println!("  Last updated: {}", updated);
    }
    println!("  Records: {}", result.total_records);

    if !result.statuses.is_empty() {
        println!();
        println!("Statuses:");
        for (status, count) in &result.statuses {
            println!("  {:<20} {}", status, count);
        }
    }

    println!();
    println!("Backups: {}", result.backups.len());
    for backup in &result.backups {
        println!(
            "  {} ({} records, {} bytes)",
            backup.created, backup.record_count, backup.size
        );
    }

    if result.emergency_captures > 0 {
        println!();
        println!(
            "⚠ {} emergency capture(s) awaiting manual recovery",
            result.emergency_captures
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimflow_testkit::scenarios::populated_store;
    use claimflow_testkit::TestStore;

    #[test]
    fn collects_populated_store() {
        let store = populated_store(12);
        store
            .update_status("C0", "Aprobado", claimflow_core::HistoryMode::Track)
            .unwrap();

        let result = collect(store.path()).unwrap();
        assert_eq!(result.total_records, 12);
        assert_eq!(result.statuses.get("Aprobado"), Some(&1));
        assert_eq!(result.statuses.get("Enviado"), Some(&11));
        assert_eq!(result.backups.len(), 1);
        assert_eq!(result.backups[0].record_count, 9);
        assert_eq!(result.emergency_captures, 0);
        assert!(result.last_updated.is_some());
    }

    #[test]
    fn empty_store() {
        let store = TestStore::new();
        let result = collect(store.path()).unwrap();
        assert_eq!(result.total_records, 0);
        assert!(result.backups.is_empty());
    }

    #[test]
    fn missing_store() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect(dir.path()).is_err());
    }
}
