//! CLI command implementations.

pub mod backups;
pub mod inspect;
pub mod serve;
pub mod verify;

/// Formats epoch milliseconds as RFC 3339.
pub(crate) fn format_timestamp(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| format!("{ms} ms since epoch"))
}
