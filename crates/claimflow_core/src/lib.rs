//! # Claimflow Core
//!
//! Durable claim record store for Claimflow.
//!
//! This crate provides:
//! - The on-disk claim schema (records, metadata, status history)
//! - Atomic write-then-rename commits of the whole collection
//! - Periodic immutable backups and emergency capture of failed payloads
//! - Read projections (pagination, search, statistics, status history)
//!
//! ## Concurrency
//!
//! A [`RecordStore`] owns a single writer-exclusion domain. Every mutation,
//! whether an append from the queue consumer or a status update from the HTTP
//! surface, is serialized through it. Readers see the latest committed
//! snapshot and never a partially applied one.
//!
//! Across processes, an advisory `LOCK` file admits one opener per directory.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod backup;
mod config;
mod dir;
mod emergency;
mod error;
pub mod projection;
mod store;
mod types;

pub use backup::{BackupInfo, BackupManager};
pub use config::{StoreConfig, DEFAULT_BACKUP_INTERVAL};
pub use dir::{backups_dir_in, read_snapshot_file, snapshot_path_in, StoreDir};
pub use emergency::EmergencyCapture;
pub use error::{CoreError, CoreResult};
pub use store::{RecordStore, StatusUpdate};
pub use types::{
    ClaimFields, ClaimRecord, Collection, HistoryMode, StatusChange, StoreMetadata,
    INITIAL_STATUS, SCHEMA_VERSION,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
