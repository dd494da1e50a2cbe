//! Claim record and collection types.
//!
//! These types are the on-disk schema: the store file is the JSON encoding of
//! a [`Collection`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema version tag written into new collections.
pub const SCHEMA_VERSION: &str = "1.0";

/// Status assigned to claims submitted without one.
pub const INITIAL_STATUS: &str = "Enviado";

/// Caller-supplied claim fields, merged into a record on append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimFields {
    /// External identifier. Not required to be unique.
    pub id: String,
    /// Customer name.
    pub customer: String,
    /// Claimed amount.
    pub amount: f64,
    /// Free-form description.
    pub description: String,
    /// Status label.
    pub status: String,
}

impl ClaimFields {
    /// Creates claim fields with the initial status.
    pub fn new(
        id: impl Into<String>,
        customer: impl Into<String>,
        amount: f64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            customer: customer.into(),
            amount,
            description: description.into(),
            status: INITIAL_STATUS.to_string(),
        }
    }

    /// Replaces the status label.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

/// One entry of a claim's status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Status before the change.
    pub previous_status: String,
    /// When the change was applied.
    pub changed_at: DateTime<Utc>,
}

/// A persisted claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Position at insertion time, assigned by the store.
    pub index: u64,
    /// Creation time, assigned by the store.
    pub timestamp: DateTime<Utc>,
    /// External identifier.
    pub id: String,
    /// Customer name.
    pub customer: String,
    /// Claimed amount.
    pub amount: f64,
    /// Free-form description.
    pub description: String,
    /// Current status label.
    pub status: String,
    /// Time of the last status mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Append-only status history, present after the first tracked mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_history: Option<Vec<StatusChange>>,
}

impl ClaimRecord {
    /// Builds a new record from caller fields.
    pub fn from_fields(index: u64, timestamp: DateTime<Utc>, fields: ClaimFields) -> Self {
        Self {
            index,
            timestamp,
            id: fields.id,
            customer: fields.customer,
            amount: fields.amount,
            description: fields.description,
            status: fields.status,
            last_modified: None,
            status_history: None,
        }
    }

    /// Returns the status history, empty if none was recorded.
    pub fn history(&self) -> &[StatusChange] {
        self.status_history.as_deref().unwrap_or(&[])
    }

    /// Applies a status change and returns the previous status.
    pub fn apply_status(&mut self, status: &str, mode: HistoryMode, at: DateTime<Utc>) -> String {
        let previous = std::mem::replace(&mut self.status, status.to_string());
        if mode == HistoryMode::Track {
            self.status_history
                .get_or_insert_with(Vec::new)
                .push(StatusChange {
                    previous_status: previous.clone(),
                    changed_at: at,
                });
        }
        self.last_modified = Some(at);
        previous
    }
}

/// Whether a status update records a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryMode {
    /// Full replace: status and `last_modified` only.
    Replace,
    /// Partial update: also appends to `status_history`.
    Track,
}

impl HistoryMode {
    /// The HTTP verb this mode is exposed under.
    pub fn operation(self) -> &'static str {
        match self {
            HistoryMode::Replace => "PUT",
            HistoryMode::Track => "PATCH",
        }
    }
}

impl fmt::Display for HistoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation())
    }
}

/// Collection-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// When the collection was first created.
    pub created_at: DateTime<Utc>,
    /// Schema version tag.
    pub version: String,
    /// Number of records, recomputed on every write.
    pub total_records: u64,
    /// Time of the most recent mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// The full durable state: metadata plus records in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Collection metadata.
    pub metadata: StoreMetadata,
    /// Records ordered by index.
    pub claims: Vec<ClaimRecord>,
}

impl Collection {
    /// Creates an empty collection created at `now`.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            metadata: StoreMetadata {
                created_at: now,
                version: SCHEMA_VERSION.to_string(),
                total_records: 0,
                last_updated: None,
            },
            claims: Vec::new(),
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Index the next appended record receives.
    pub fn next_index(&self) -> u64 {
        self.claims.len() as u64
    }

    /// First record with the given id.
    pub fn find(&self, id: &str) -> Option<&ClaimRecord> {
        self.claims.iter().find(|c| c.id == id)
    }

    /// Mutable access to the first record with the given id.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut ClaimRecord> {
        self.claims.iter_mut().find(|c| c.id == id)
    }

    /// Recomputes `total_records` and stamps `last_updated`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.metadata.total_records = self.claims.len() as u64;
        self.metadata.last_updated = Some(now);
    }

    /// Checks the count and index invariants.
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.metadata.total_records != self.claims.len() as u64 {
            return Err(format!(
                "total_records is {} but {} records are present",
                self.metadata.total_records,
                self.claims.len()
            ));
        }
        for (position, claim) in self.claims.iter().enumerate() {
            if claim.index != position as u64 {
                return Err(format!(
                    "record at position {position} (id {}) has index {}",
                    claim.id, claim.index
                ));
            }
        }
        Ok(())
    }
}
