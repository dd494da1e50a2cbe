//! Error types for the claim record store.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in record store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// No claim with the given id exists.
    #[error("claim {id} not found")]
    ClaimNotFound {
        /// The id that was looked up.
        id: String,
    },

    /// The on-disk snapshot could not be parsed.
    #[error("claims file is corrupted: {message}")]
    CorruptSnapshot {
        /// Description of the corruption.
        message: String,
    },

    /// A commit failed. The payload may have been captured for manual recovery.
    #[error("persistence failure: {message}")]
    PersistenceFailure {
        /// Description of the failure.
        message: String,
        /// Emergency capture file, if one could be written.
        emergency: Option<PathBuf>,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// The claim cannot be stored as given.
    #[error("invalid claim: {message}")]
    InvalidClaim {
        /// What is wrong with the claim.
        message: String,
    },

    /// Invalid store directory or layout.
    #[error("invalid store: {message}")]
    InvalidStore {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates a claim-not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::ClaimNotFound { id: id.into() }
    }

    /// Creates a corrupt snapshot error.
    pub fn corrupt_snapshot(message: impl Into<String>) -> Self {
        Self::CorruptSnapshot {
            message: message.into(),
        }
    }

    /// Creates a persistence failure error.
    pub fn persistence_failure(message: impl Into<String>, emergency: Option<PathBuf>) -> Self {
        Self::PersistenceFailure {
            message: message.into(),
            emergency,
        }
    }

    /// Creates an invalid claim error.
    pub fn invalid_claim(message: impl Into<String>) -> Self {
        Self::InvalidClaim {
            message: message.into(),
        }
    }

    /// Creates an invalid store error.
    pub fn invalid_store(message: impl Into<String>) -> Self {
        Self::InvalidStore {
            message: message.into(),
        }
    }

    /// Returns true if the error means the record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::ClaimNotFound { .. })
    }

    /// Returns true if a retry of the same operation may succeed.
    ///
    /// Missing records, invalid claims and corrupt snapshots are not
    /// retryable; commit and I/O failures are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Io(_) | CoreError::PersistenceFailure { .. } | CoreError::StoreLocked
        )
    }
}
