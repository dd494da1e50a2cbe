//! Store directory management.
//!
//! This module handles the file system layout of a record store:
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK               # Advisory lock for single-process access
//! ├─ claims.json        # Committed snapshot
//! ├─ claims.json.tmp    # In-flight commit, never read
//! ├─ backups/           # Immutable periodic snapshots
//! └─ emergency/         # Payloads captured after failed commits
//! ```
//!
//! The LOCK file ensures only one process mutates the store at a time. Within
//! that process, writers are serialized by [`crate::RecordStore`].

use crate::error::{CoreError, CoreResult};
use crate::types::Collection;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// File names within the store directory.
const LOCK_FILE: &str = "LOCK";
const SNAPSHOT_FILE: &str = "claims.json";
/// Temporary file for atomic snapshot writes.
const SNAPSHOT_TEMP: &str = "claims.json.tmp";
const BACKUPS_DIR: &str = "backups";
const EMERGENCY_DIR: &str = "emergency";

/// Manages the store directory structure and file locking.
///
/// # Thread Safety
///
/// The `StoreDir` holds an exclusive advisory lock on the directory. Only one
/// `StoreDir` instance can exist per directory at a time, across processes.
#[derive(Debug)]
pub struct StoreDir {
    /// Root directory path.
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl StoreDir {
    /// Opens or creates a store directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `StoreLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_store(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_store(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked);
        }

        fs::create_dir_all(path.join(BACKUPS_DIR))?;
        fs::create_dir_all(path.join(EMERGENCY_DIR))?;

        let dir = Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        };
        dir.remove_stale_temp()?;
        Ok(dir)
    }

    /// Returns the path to the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the committed snapshot.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        snapshot_path_in(&self.path)
    }

    /// Returns the path of the in-flight commit file.
    #[must_use]
    pub fn temp_path(&self) -> PathBuf {
        self.path.join(SNAPSHOT_TEMP)
    }

    /// Returns the backups directory.
    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        backups_dir_in(&self.path)
    }

    /// Returns the emergency capture directory.
    #[must_use]
    pub fn emergency_dir(&self) -> PathBuf {
        self.path.join(EMERGENCY_DIR)
    }

    /// Reads the committed snapshot.
    ///
    /// Returns `None` if no snapshot exists yet and `CorruptSnapshot` if the
    /// file exists but is not a well-formed collection.
    pub fn read_snapshot(&self) -> CoreResult<Option<Collection>> {
        read_snapshot_file(&self.snapshot_path())
    }

    /// Saves the snapshot atomically.
    ///
    /// Uses write-then-rename for crash safety:
    /// 1. Write to temporary file
    /// 2. Sync temporary file to disk
    /// 3. Rename temporary file over `claims.json`
    /// 4. Fsync the directory so the rename is durable
    pub fn save_snapshot(&self, collection: &Collection, sync: bool) -> CoreResult<()> {
        let data = serde_json::to_vec_pretty(collection)?;
        let temp_path = self.temp_path();

        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        if sync {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&temp_path, self.snapshot_path())?;

        if sync {
            self.sync_directory()?;
        }
        Ok(())
    }

    /// Copies an unreadable snapshot aside so a fresh commit cannot destroy it.
    pub fn quarantine_snapshot(&self, suffix: &str) -> CoreResult<PathBuf> {
        let target = self.path.join(format!("{SNAPSHOT_FILE}.corrupt-{suffix}"));
        fs::copy(self.snapshot_path(), &target)?;
        Ok(target)
    }

    /// Returns the size in bytes of the committed snapshot, 0 if absent.
    pub fn snapshot_size(&self) -> CoreResult<u64> {
        match fs::metadata(self.snapshot_path()) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a temporary file left behind by an interrupted commit.
    fn remove_stale_temp(&self) -> CoreResult<()> {
        match fs::remove_file(self.temp_path()) {
            Ok(()) => {
                tracing::warn!(
                    path = %self.temp_path().display(),
                    "removed temporary file from an interrupted commit"
                );
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Syncs the store directory so renames are durable.
    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        // NTFS journals metadata; directory handles cannot be fsynced
        Ok(())
    }
}

/// Returns the snapshot path inside a store directory.
#[must_use]
pub fn snapshot_path_in(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE)
}

/// Returns the backups directory inside a store directory.
#[must_use]
pub fn backups_dir_in(dir: &Path) -> PathBuf {
    dir.join(BACKUPS_DIR)
}

/// Reads a snapshot file without taking the store lock.
///
/// Readers never see a torn file because commits replace it by rename.
pub fn read_snapshot_file(path: &Path) -> CoreResult<Option<Collection>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| CoreError::corrupt_snapshot(e.to_string()))
}
