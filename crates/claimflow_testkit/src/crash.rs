//! Crash recovery testing for the record store.
//!
//! A commit writes `claims.json.tmp`, syncs it and renames it over
//! `claims.json`. A process killed at any point leaves one of the states in
//! [`CrashPoint`] behind. The harness reproduces that state on disk, reopens
//! the store and checks what survived.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use claimflow_testkit::crash::{CrashPoint, CrashRecoveryHarness};
//!
//! let mut harness = CrashRecoveryHarness::with_temp_dir()?;
//! let result = harness.run(CrashPoint::DuringTempWrite, 3);
//! assert!(result.passed);
//! ```

use crate::fixtures::{fast_config, sample_claim};
use claimflow_core::{snapshot_path_in, RecordStore};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Points at which a commit can be interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Killed before the temp file was created.
    BeforeTempWrite,
    /// Killed while writing the temp file (partial JSON left behind).
    DuringTempWrite,
    /// Killed after the temp file was complete but before the rename.
    BeforeRename,
    /// The committed snapshot itself was damaged outside the store.
    SnapshotDamaged,
}

impl CrashPoint {
    /// Every crash point.
    pub const ALL: [CrashPoint; 4] = [
        CrashPoint::BeforeTempWrite,
        CrashPoint::DuringTempWrite,
        CrashPoint::BeforeRename,
        CrashPoint::SnapshotDamaged,
    ];

    /// Records expected after reopening a store that held `committed`.
    pub fn expected_records(self, committed: usize) -> usize {
        match self {
            CrashPoint::SnapshotDamaged => 0,
            _ => committed,
        }
    }
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// The crash point exercised.
    pub point: CrashPoint,
    /// Expected records after recovery.
    pub expected_records: usize,
    /// Actual records after recovery.
    pub actual_records: usize,
    /// Any error message.
    pub error: Option<String>,
}

/// Test harness for crash recovery scenarios.
pub struct CrashRecoveryHarness {
    dir: PathBuf,
    _temp_dir: Option<TempDir>,
    /// Results of the runs so far.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a harness over an existing directory.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            _temp_dir: None,
            results: Vec::new(),
        }
    }

    /// Creates a harness with a temporary directory.
    pub fn with_temp_dir() -> io::Result<Self> {
        let temp_dir = TempDir::new()?;
        Ok(Self {
            dir: temp_dir.path().to_path_buf(),
            _temp_dir: Some(temp_dir),
            results: Vec::new(),
        })
    }

    /// Commits `records` sample claims, simulates a crash at `point`,
    /// reopens the store and checks the surviving state.
    pub fn run(&mut self, point: CrashPoint, records: usize) -> CrashRecoveryResult {
        let expected = point.expected_records(records);
        let store_dir = self.dir.join(format!("{point:?}").to_lowercase());

        let result = match Self::exercise(&store_dir, point, records) {
            Ok(actual) => CrashRecoveryResult {
                passed: actual == expected,
                point,
                expected_records: expected,
                actual_records: actual,
                error: None,
            },
            Err(e) => CrashRecoveryResult {
                passed: false,
                point,
                expected_records: expected,
                actual_records: 0,
                error: Some(e),
            },
        };

        self.results.push(result.clone());
        result
    }

    /// Returns true if every run so far passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    fn exercise(dir: &Path, point: CrashPoint, records: usize) -> Result<usize, String> {
        {
            let store = RecordStore::open(dir, fast_config()).map_err(|e| e.to_string())?;
            for n in 0..records {
                store
                    .append_record(sample_claim(n))
                    .map_err(|e| e.to_string())?;
            }
        }

        simulate_crash(dir, point).map_err(|e| e.to_string())?;

        let store = RecordStore::open(dir, fast_config()).map_err(|e| e.to_string())?;
        let collection = store.read_disk().map_err(|e| e.to_string())?;
        collection.check_invariants()?;
        if point == CrashPoint::SnapshotDamaged && !store.recovered_from_corruption() {
            return Err("damaged snapshot was not reported".to_string());
        }
        Ok(collection.len())
    }
}

/// Leaves the files a crash at `point` would leave in a closed store `dir`.
pub fn simulate_crash(dir: &Path, point: CrashPoint) -> io::Result<()> {
    let snapshot = snapshot_path_in(dir);
    let temp = dir.join("claims.json.tmp");

    match point {
        CrashPoint::BeforeTempWrite => Ok(()),
        CrashPoint::DuringTempWrite => {
            let committed = fs::read(&snapshot)?;
            let partial = &committed[..committed.len() / 2];
            fs::write(temp, partial)
        }
        CrashPoint::BeforeRename => {
            // A complete next state that was never renamed into place.
            let mut next: serde_json::Value = serde_json::from_slice(&fs::read(&snapshot)?)?;
            next["metadata"]["total_records"] = serde_json::Value::from(0);
            next["claims"] = serde_json::Value::Array(Vec::new());
            fs::write(temp, serde_json::to_vec_pretty(&next)?)
        }
        CrashPoint::SnapshotDamaged => {
            let committed = fs::read(&snapshot)?;
            fs::write(&snapshot, &committed[..committed.len() / 3])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_crash_point_recovers() {
        let mut harness = CrashRecoveryHarness::with_temp_dir().unwrap();
        for point in CrashPoint::ALL {
            let result = harness.run(point, 4);
            assert!(result.passed, "{result:?}");
        }
        assert!(harness.all_passed());
        assert_eq!(harness.results.len(), 4);
    }

    #[test]
    fn damaged_snapshot_is_preserved_aside() {
        let mut harness = CrashRecoveryHarness::with_temp_dir().unwrap();
        harness.run(CrashPoint::SnapshotDamaged, 2);

        let store_dir = harness.dir.join("snapshotdamaged");
        let preserved = fs::read_dir(&store_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("claims.json.corrupt-"));
        assert!(preserved);
    }
}
