//! Read-only views over a committed collection.
//!
//! Projections never touch the writer mutex. They operate on whatever snapshot
//! the caller obtained from [`crate::RecordStore::read_all`].

use crate::error::{CoreError, CoreResult};
use crate::types::{ClaimRecord, Collection, StatusChange, StoreMetadata};
use serde::Serialize;

/// Default page size for [`page`].
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Pagination echo included with a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// Requested page size.
    pub limit: usize,
    /// Requested offset.
    pub offset: usize,
    /// Number of records actually returned.
    pub returned: usize,
}

/// A window of records plus collection metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimPage {
    /// Records in the window, in index order.
    pub claims: Vec<ClaimRecord>,
    /// Total number of records in the collection.
    pub total: usize,
    /// Collection metadata.
    pub metadata: StoreMetadata,
    /// Pagination echo.
    pub pagination: Pagination,
}

/// Search hits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Matching records, in index order.
    pub claims: Vec<ClaimRecord>,
    /// Number of matches.
    pub total: usize,
}

/// Aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimStats {
    /// Number of records.
    pub total_claims: usize,
    /// Sum of all amounts.
    pub total_amount: f64,
    /// Mean amount, 0 when there are no records.
    pub average_amount: f64,
    /// Size of the store file in bytes.
    pub file_size_bytes: u64,
    /// Collection metadata.
    pub metadata: StoreMetadata,
}

/// Status history of one claim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusHistoryView {
    /// The claim id.
    pub claim_id: String,
    /// Status at the time of the read.
    pub current_status: String,
    /// Recorded transitions, oldest first.
    pub status_history: Vec<StatusChange>,
}

/// Returns up to `limit` records starting at `offset`.
///
/// An offset past the end yields an empty page.
pub fn page(collection: &Collection, limit: usize, offset: usize) -> ClaimPage {
    let claims: Vec<ClaimRecord> = collection
        .claims
        .iter()
        .skip(offset)
        .take(limit)
        .cloned()
        .collect();

    ClaimPage {
        total: collection.len(),
        metadata: collection.metadata.clone(),
        pagination: Pagination {
            limit,
            offset,
            returned: claims.len(),
        },
        claims,
    }
}

/// Case-insensitive substring search over customer and description.
pub fn search(collection: &Collection, query: &str) -> SearchResult {
    let needle = query.to_lowercase();
    let claims: Vec<ClaimRecord> = collection
        .claims
        .iter()
        .filter(|c| {
            c.customer.to_lowercase().contains(&needle)
                || c.description.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect();

    SearchResult {
        total: claims.len(),
        claims,
    }
}

/// Computes aggregate statistics for a collection read from disk.
pub fn stats(collection: &Collection, file_size_bytes: u64) -> ClaimStats {
    let total_claims = collection.len();
    let total_amount: f64 = collection.claims.iter().map(|c| c.amount).sum();
    let average_amount = if total_claims == 0 {
        0.0
    } else {
        total_amount / total_claims as f64
    };

    ClaimStats {
        total_claims,
        total_amount,
        average_amount,
        file_size_bytes,
        metadata: collection.metadata.clone(),
    }
}

/// Returns the status history of the first claim with `id`.
pub fn status_history(collection: &Collection, id: &str) -> CoreResult<StatusHistoryView> {
    let claim = collection.find(id).ok_or_else(|| CoreError::not_found(id))?;
    Ok(StatusHistoryView {
        claim_id: claim.id.clone(),
        current_status: claim.status.clone(),
        status_history: claim.history().to_vec(),
    })
}
