//! Test fixtures and store helpers.

use claimflow_core::{ClaimFields, RecordStore, StoreConfig};
use claimflow_protocol::ClaimSubmission;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A record store in a temporary directory, removed on drop.
pub struct TestStore {
    /// The shared store.
    pub store: Arc<RecordStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestStore {
    /// Opens a store with fsync disabled.
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    /// Opens a store with the given configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RecordStore::open(temp_dir.path(), config).expect("Failed to open store");
        Self {
            store: Arc::new(store),
            temp_dir,
        }
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns a new handle to the shared store.
    pub fn shared(&self) -> Arc<RecordStore> {
        Arc::clone(&self.store)
    }

    /// Drops the store (releasing its lock) and keeps the directory.
    pub fn into_dir(self) -> TempDir {
        drop(self.store);
        self.temp_dir
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = RecordStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Store configuration without fsync, for fast tests.
pub fn fast_config() -> StoreConfig {
    StoreConfig::default().sync_on_commit(false)
}

/// The n-th sample claim.
pub fn sample_claim(n: usize) -> ClaimFields {
    ClaimFields::new(
        format!("C{n}"),
        format!("Customer {n}"),
        100.0 + n as f64,
        format!("Sample claim {n}"),
    )
}

/// The n-th sample submission, matching [`sample_claim`].
pub fn sample_submission(n: usize) -> ClaimSubmission {
    let claim = sample_claim(n);
    ClaimSubmission::new(claim.id, claim.customer, claim.amount, claim.description)
}

/// Runs a test with a temporary store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&RecordStore) -> R,
{
    let test_store = TestStore::new();
    f(&test_store.store)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a store holding `count` sample claims.
    pub fn populated_store(count: usize) -> TestStore {
        let test_store = TestStore::new();
        for n in 0..count {
            test_store
                .append_record(sample_claim(n))
                .expect("Failed to append sample claim");
        }
        test_store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_starts_empty() {
        let store = TestStore::new();
        assert!(store.read_all().is_empty());
        assert!(store.path().join("claims.json").exists());
    }

    #[test]
    fn populated_scenario() {
        let store = scenarios::populated_store(3);
        assert_eq!(store.read_all().len(), 3);
        assert_eq!(store.read_by_id("C2").unwrap().amount, 102.0);
    }

    #[test]
    fn into_dir_releases_lock() {
        let dir = scenarios::populated_store(2).into_dir();
        let reopened = RecordStore::open(dir.path(), fast_config()).unwrap();
        assert_eq!(reopened.read_all().len(), 2);
    }

    #[test]
    fn submission_matches_claim() {
        let submission = sample_submission(4);
        assert_eq!(submission.id, "C4");
        assert!(submission.validate().is_ok());
    }
}
