//! The record store: durable, atomically committed claim collection.

use crate::backup::{BackupInfo, BackupManager};
use crate::config::StoreConfig;
use crate::dir::StoreDir;
use crate::emergency::EmergencyCapture;
use crate::error::{CoreError, CoreResult};
use crate::types::{ClaimFields, ClaimRecord, Collection, HistoryMode};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of a successful status update.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    /// The record after the update.
    pub record: ClaimRecord,
    /// Status before the update.
    pub previous_status: String,
}

/// Payload captured when a status update fails to commit.
#[derive(Debug, Serialize)]
struct FailedStatusUpdate<'a> {
    id: &'a str,
    status: &'a str,
    operation: &'static str,
}

/// Durable claim collection shared by every writer in the process.
///
/// All mutations (`append_record` and `update_status`) go through one writer
/// mutex owned by the store, so the queue consumer and HTTP handlers must share
/// the same instance (usually behind an `Arc`). Readers take the latest
/// committed snapshot and never wait for a commit to finish.
///
/// # Example
///
/// ```rust,ignore
/// use claimflow_core::{ClaimFields, RecordStore, StoreConfig};
///
/// let store = RecordStore::open(Path::new("data"), StoreConfig::default())?;
/// let record = store.append_record(ClaimFields::new("A1", "X", 100.0, "d1"))?;
/// assert_eq!(record.index, 0);
/// ```
pub struct RecordStore {
    /// Directory layout and process lock.
    dir: StoreDir,
    /// Configuration.
    config: StoreConfig,
    /// Periodic backups.
    backups: BackupManager,
    /// Failed-commit capture.
    emergency: EmergencyCapture,
    /// Writer-exclusion domain for every mutation.
    writer: Mutex<()>,
    /// Latest committed snapshot.
    committed: RwLock<Arc<Collection>>,
    /// Whether open found an unreadable snapshot and started over.
    recovered_from_corruption: bool,
}

impl RecordStore {
    /// Opens a store with the default configuration.
    pub fn open_default(path: &Path) -> CoreResult<Self> {
        Self::open(path, StoreConfig::default())
    }

    /// Opens or creates a store in `path`.
    ///
    /// A missing snapshot is initialized and committed immediately. A corrupt
    /// snapshot is copied aside and replaced by an empty collection; this loses
    /// the visible records and is logged at error level.
    ///
    /// # Errors
    ///
    /// Returns `StoreLocked` if another process has the directory open.
    pub fn open(path: &Path, config: StoreConfig) -> CoreResult<Self> {
        let dir = StoreDir::open(path, config.create_if_missing)?;
        let (collection, recovered_from_corruption) = Self::load(&dir, config.sync_on_commit)?;

        if let Err(violation) = collection.check_invariants() {
            warn!(%violation, "store opened with inconsistent metadata");
        }

        info!(
            path = %dir.path().display(),
            records = collection.len(),
            "record store opened"
        );

        let backups = BackupManager::new(dir.backups_dir(), config.backup_interval);
        let emergency = EmergencyCapture::new(dir.emergency_dir());

        Ok(Self {
            dir,
            config,
            backups,
            emergency,
            writer: Mutex::new(()),
            committed: RwLock::new(Arc::new(collection)),
            recovered_from_corruption,
        })
    }

    /// Loads the committed snapshot, initializing or recovering as needed.
    fn load(dir: &StoreDir, sync: bool) -> CoreResult<(Collection, bool)> {
        match dir.read_snapshot() {
            Ok(Some(collection)) => Ok((collection, false)),
            Ok(None) => {
                let collection = Collection::empty(Utc::now());
                dir.save_snapshot(&collection, sync)?;
                debug!(path = %dir.snapshot_path().display(), "initialized empty collection");
                Ok((collection, false))
            }
            Err(CoreError::CorruptSnapshot { message }) => {
                let now = Utc::now();
                let preserved = dir.quarantine_snapshot(&now.timestamp_millis().to_string())?;
                error!(
                    %message,
                    preserved = %preserved.display(),
                    "claims file is corrupted, starting from an empty collection (data loss)"
                );
                let collection = Collection::empty(now);
                dir.save_snapshot(&collection, sync)?;
                Ok((collection, true))
            }
            Err(e) => Err(e),
        }
    }

    /// Appends a claim and commits it.
    ///
    /// The store assigns `index` and `timestamp`. Every n-th successful append
    /// also writes a backup of the pre-append collection.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClaim` without writing anything if the amount is NaN
    /// or infinite, which the JSON snapshot cannot represent.
    ///
    /// Returns `PersistenceFailure` if the commit failed. The record was not
    /// stored; its payload was written to the emergency directory if possible.
    pub fn append_record(&self, fields: ClaimFields) -> CoreResult<ClaimRecord> {
        if !fields.amount.is_finite() {
            warn!(id = %fields.id, amount = %fields.amount, "rejected claim with non-finite amount");
            return Err(CoreError::invalid_claim(format!(
                "amount must be finite, got {}",
                fields.amount
            )));
        }

        let _guard = self.writer.lock();

        let current = self.snapshot();
        let now = Utc::now();

        let mut next = (*current).clone();
        let record = ClaimRecord::from_fields(next.next_index(), now, fields);
        next.claims.push(record.clone());
        next.touch(now);

        if let Err(e) = self.dir.save_snapshot(&next, self.config.sync_on_commit) {
            return Err(self.capture_failure(&record, &e, now));
        }
        *self.committed.write() = Arc::new(next);

        info!(id = %record.id, index = record.index, "claim committed");

        if self.backups.is_due(record.index + 1) {
            self.write_backup(&current, now);
        }

        Ok(record)
    }

    /// Sets the status of the first claim with `id` and commits it.
    ///
    /// With [`HistoryMode::Track`] the previous status is appended to the
    /// claim's history.
    ///
    /// # Errors
    ///
    /// Returns `ClaimNotFound` without writing anything if no claim has `id`,
    /// and `PersistenceFailure` if the commit failed.
    pub fn update_status(
        &self,
        id: &str,
        status: &str,
        mode: HistoryMode,
    ) -> CoreResult<StatusUpdate> {
        let _guard = self.writer.lock();

        let now = Utc::now();
        let mut next = (*self.snapshot()).clone();
        let Some(claim) = next.find_mut(id) else {
            return Err(CoreError::not_found(id));
        };
        let previous_status = claim.apply_status(status, mode, now);
        let record = claim.clone();
        next.touch(now);

        if let Err(e) = self.dir.save_snapshot(&next, self.config.sync_on_commit) {
            let payload = FailedStatusUpdate {
                id,
                status,
                operation: mode.operation(),
            };
            return Err(self.capture_failure(&payload, &e, now));
        }
        *self.committed.write() = Arc::new(next);

        info!(
            %id,
            from = %previous_status,
            to = %status,
            operation = mode.operation(),
            "claim status updated"
        );

        Ok(StatusUpdate {
            record,
            previous_status,
        })
    }

    /// Returns the latest committed collection.
    pub fn read_all(&self) -> Arc<Collection> {
        self.snapshot()
    }

    /// Returns the first claim with `id`.
    pub fn read_by_id(&self, id: &str) -> CoreResult<ClaimRecord> {
        self.snapshot()
            .find(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(id))
    }

    /// Re-reads the snapshot file, failing with `CorruptSnapshot` if it is
    /// unreadable.
    pub fn read_disk(&self) -> CoreResult<Collection> {
        self.dir
            .read_snapshot()?
            .ok_or_else(|| CoreError::corrupt_snapshot("claims file is missing"))
    }

    /// Size of the committed snapshot file in bytes.
    pub fn file_size(&self) -> CoreResult<u64> {
        self.dir.snapshot_size()
    }

    /// Lists backups, oldest first.
    pub fn list_backups(&self) -> CoreResult<Vec<BackupInfo>> {
        self.backups.list()
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Whether open discarded an unreadable snapshot.
    pub fn recovered_from_corruption(&self) -> bool {
        self.recovered_from_corruption
    }

    fn snapshot(&self) -> Arc<Collection> {
        Arc::clone(&self.committed.read())
    }

    fn write_backup(&self, pre_append: &Collection, now: DateTime<Utc>) {
        match self
            .backups
            .write_backup(pre_append, now.timestamp_millis().max(0) as u64)
        {
            Ok(path) => info!(
                path = %path.display(),
                records = pre_append.len(),
                "backup written"
            ),
            // The append itself is already committed.
            Err(e) => error!(error = %e, "failed to write backup"),
        }
    }

    /// Captures a failed payload and builds the error returned to the caller.
    fn capture_failure<T: Serialize>(
        &self,
        payload: &T,
        cause: &CoreError,
        now: DateTime<Utc>,
    ) -> CoreError {
        let message = cause.to_string();
        error!(error = %message, "commit failed");

        let emergency = match self.emergency.capture(payload, &message, now) {
            Ok(path) => {
                warn!(path = %path.display(), "failed payload captured");
                Some(path)
            }
            Err(e) => {
                error!(error = %e, "emergency capture failed");
                None
            }
        };

        CoreError::persistence_failure(message, emergency)
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("path", &self.dir.path())
            .field("records", &self.snapshot().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn claim(id: &str) -> ClaimFields {
        ClaimFields::new(id, "X", 100.0, "d1")
    }

    #[test]
    fn open_initializes_file() {
        let temp = tempdir().unwrap();
        let store = RecordStore::open_default(temp.path()).unwrap();

        assert!(temp.path().join("claims.json").exists());
        assert!(store.read_all().is_empty());
        assert_eq!(store.read_disk().unwrap().metadata.total_records, 0);
        assert!(!store.recovered_from_corruption());
    }

    #[test]
    fn append_assigns_contiguous_indices() {
        let temp = tempdir().unwrap();
        let store = RecordStore::open_default(temp.path()).unwrap();

        let a1 = store.append_record(claim("A1")).unwrap();
        let a2 = store.append_record(claim("A2")).unwrap();

        assert_eq!(a1.index, 0);
        assert_eq!(a2.index, 1);
        let all = store.read_all();
        assert_eq!(all.metadata.total_records, 2);
        assert!(all.metadata.last_updated.is_some());
        assert_eq!(store.read_disk().unwrap(), *all);
    }

    #[test]
    fn replace_update_keeps_history_empty() {
        let temp = tempdir().unwrap();
        let store = RecordStore::open_default(temp.path()).unwrap();
        store.append_record(claim("A1")).unwrap();

        let update = store
            .update_status("A1", "Aprobado", HistoryMode::Replace)
            .unwrap();

        assert_eq!(update.previous_status, "Enviado");
        assert_eq!(update.record.status, "Aprobado");
        assert!(update.record.last_modified.is_some());
        assert!(update.record.status_history.is_none());
        assert_eq!(store.read_by_id("A1").unwrap(), update.record);
    }

    #[test]
    fn tracked_update_starts_history() {
        let temp = tempdir().unwrap();
        let store = RecordStore::open_default(temp.path()).unwrap();
        store.append_record(claim("A1")).unwrap();

        let update = store
            .update_status("A1", "Revisado", HistoryMode::Track)
            .unwrap();

        let history = update.record.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].previous_status, "Enviado");
        assert_eq!(Some(history[0].changed_at), update.record.last_modified);
    }

    #[test]
    fn missing_id_leaves_file_untouched() {
        let temp = tempdir().unwrap();
        let store = RecordStore::open_default(temp.path()).unwrap();
        store.append_record(claim("A1")).unwrap();
        let before = fs::read(temp.path().join("claims.json")).unwrap();

        let result = store.update_status("nope", "Aprobado", HistoryMode::Track);

        assert!(matches!(result, Err(CoreError::ClaimNotFound { .. })));
        assert_eq!(fs::read(temp.path().join("claims.json")).unwrap(), before);
    }

    #[test]
    fn non_finite_amount_is_rejected_before_commit() {
        let temp = tempdir().unwrap();
        let store = RecordStore::open_default(temp.path()).unwrap();
        store.append_record(claim("A1")).unwrap();
        let before = fs::read(temp.path().join("claims.json")).unwrap();

        for amount in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = store
                .append_record(ClaimFields::new("bad", "X", amount, "d"))
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidClaim { .. }), "{err:?}");
            assert!(!err.is_retryable());
        }

        assert_eq!(fs::read(temp.path().join("claims.json")).unwrap(), before);
        assert_eq!(store.read_all().len(), 1);
        assert_eq!(fs::read_dir(store.dir.emergency_dir()).unwrap().count(), 0);

        // The next good claim still gets the next index, and the file reloads.
        assert_eq!(store.append_record(claim("A2")).unwrap().index, 1);
        drop(store);
        let store = RecordStore::open_default(temp.path()).unwrap();
        assert!(!store.recovered_from_corruption());
        assert_eq!(store.read_all().len(), 2);
    }

    #[test]
    fn duplicate_ids_resolve_to_first() {
        let temp = tempdir().unwrap();
        let store = RecordStore::open_default(temp.path()).unwrap();
        store.append_record(claim("A1")).unwrap();
        store
            .append_record(ClaimFields::new("A1", "Y", 5.0, "second"))
            .unwrap();

        assert_eq!(store.read_by_id("A1").unwrap().index, 0);
        let update = store
            .update_status("A1", "Aprobado", HistoryMode::Replace)
            .unwrap();
        assert_eq!(update.record.index, 0);
        assert_eq!(store.read_all().claims[1].status, "Enviado");
    }

    #[test]
    fn reopen_sees_committed_state() {
        let temp = tempdir().unwrap();
        {
            let store = RecordStore::open_default(temp.path()).unwrap();
            store.append_record(claim("A1")).unwrap();
        }
        let store = RecordStore::open_default(temp.path()).unwrap();
        assert_eq!(store.read_all().len(), 1);
        assert_eq!(store.append_record(claim("A2")).unwrap().index, 1);
    }

    #[test]
    fn corrupt_file_falls_back_to_empty() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("claims.json"), b"not json at all").unwrap();

        let store = RecordStore::open_default(temp.path()).unwrap();

        assert!(store.recovered_from_corruption());
        assert!(store.read_all().is_empty());
        let preserved: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .collect();
        assert_eq!(preserved.len(), 1);
    }

    #[test]
    fn tenth_append_writes_one_backup_of_pre_append_state() {
        let temp = tempdir().unwrap();
        let store = RecordStore::open_default(temp.path()).unwrap();

        for i in 0..9 {
            store.append_record(claim(&format!("C{i}"))).unwrap();
        }
        assert!(store.list_backups().unwrap().is_empty());

        store.append_record(claim("C9")).unwrap();
        let backups = store.list_backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].record_count, 9);

        let restored = BackupManager::read_backup(&backups[0].path).unwrap();
        assert_eq!(restored.len(), 9);
        assert_eq!(restored.metadata.total_records, 9);
    }

    #[test]
    fn failed_commit_is_captured_and_not_applied() {
        let temp = tempdir().unwrap();
        let store = RecordStore::open_default(temp.path()).unwrap();
        store.append_record(claim("A1")).unwrap();

        // A directory where the temp file goes makes every commit fail.
        fs::create_dir(temp.path().join("claims.json.tmp")).unwrap();

        let err = store.append_record(claim("A2")).unwrap_err();
        let CoreError::PersistenceFailure { emergency, .. } = err else {
            panic!("expected persistence failure, got {err:?}");
        };
        let captured: serde_json::Value =
            serde_json::from_slice(&fs::read(emergency.unwrap()).unwrap()).unwrap();
        assert_eq!(captured["error_message"]["id"], "A2");

        assert_eq!(store.read_all().len(), 1);
        assert_eq!(store.read_disk().unwrap().len(), 1);
    }
}
