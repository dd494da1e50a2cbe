//! Verify command implementation.

use super::inspect::list_backups;
use claimflow_core::{read_snapshot_file, snapshot_path_in, BackupManager};
use std::path::Path;

/// Verification result for one file.
#[derive(Debug)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn new() -> Self {
        Self {
            records_checked: 0,
            errors: Vec::new(),
        }
    }

    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, check_backups: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying claims store at {:?}", path);
    println!();

    println!("Checking snapshot...");
    let snapshot = verify_snapshot(path);
    print_result("Snapshot", &snapshot);

    let mut backups_ok = true;
    if check_backups {
        println!("Checking backups...");
        for (name, result) in verify_backups(path)? {
            print_result(&name, &result);
            backups_ok &= result.is_ok();
        }
    }

    println!();
    if snapshot.is_ok() && backups_ok {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed");
        Err("Verification failed".into())
    }
}

/// Strictly re-reads `claims.json` and checks its invariants.
pub fn verify_snapshot(path: &Path) -> VerifyResult {
    let mut result = VerifyResult::new();
    match read_snapshot_file(&snapshot_path_in(path)) {
        Ok(Some(collection)) => {
            result.records_checked = collection.len();
            if let Err(e) = collection.check_invariants() {
                result.errors.push(e);
            }
        }
        Ok(None) => result.errors.push("claims.json not found".to_string()),
        Err(e) => result.errors.push(e.to_string()),
    }
    result
}

/// Checks every backup file, oldest first.
pub fn verify_backups(
    path: &Path,
) -> Result<Vec<(String, VerifyResult)>, Box<dyn std::error::Error>> {
    let mut results = Vec::new();
    for backup in list_backups(path)? {
        let name = backup
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut result = VerifyResult::new();
        match BackupManager::read_backup(&backup.path) {
            Ok(collection) => {
                result.records_checked = collection.len();
                if collection.len() as u64 != backup.record_count {
                    result.errors.push(format!(
                        "file name says {} records, file holds {}",
                        backup.record_count,
                        collection.len()
                    ));
                }
                if let Err(e) = collection.check_invariants() {
                    result.errors.push(e);
                }
            }
            Err(e) => result.errors.push(e.to_string()),
        }
        results.push((name, result));
    }
    Ok(results)
}

fn print_result(name: &str, result: &VerifyResult) {
    println!("  {}:", name);
    println!("    Records checked: {}", result.records_checked);

    if !result.errors.is_empty() {
        println!("    Errors:");
        for error in &result.errors {
            println!("      - {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimflow_testkit::scenarios::populated_store;

    #[test]
    fn healthy_store_passes() {
        let store = populated_store(11);
        let snapshot = verify_snapshot(store.path());
        assert!(snapshot.is_ok(), "{:?}", snapshot.errors);
        assert_eq!(snapshot.records_checked, 11);

        let backups = verify_backups(store.path()).unwrap();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].1.is_ok());
    }

    #[test]
    fn corrupt_snapshot_fails() {
        let store = populated_store(2);
        std::fs::write(snapshot_path_in(store.path()), b"{\"claims\": [").unwrap();
        assert!(!verify_snapshot(store.path()).is_ok());
        assert!(run(store.path(), false).is_err());
    }

    #[test]
    fn inconsistent_metadata_fails() {
        let store = populated_store(3);
        let path = snapshot_path_in(store.path());
        let mut doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        doc["metadata"]["total_records"] = serde_json::json!(7);
        std::fs::write(&path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();

        let result = verify_snapshot(store.path());
        assert!(!result.is_ok());
        assert_eq!(result.records_checked, 3);
    }
}
