//! Emergency capture of payloads whose commit failed.

use crate::error::CoreResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use uuid::Uuid;

/// A captured payload, as written to `emergency/`.
#[derive(Debug, Serialize)]
struct EmergencyRecord<'a, T: Serialize> {
    error_message: &'a T,
    error: &'a str,
    timestamp: DateTime<Utc>,
}

/// Writes failed payloads to a side directory for manual recovery.
#[derive(Debug, Clone)]
pub struct EmergencyCapture {
    dir: PathBuf,
}

impl EmergencyCapture {
    /// Creates a capture writing into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Writes `payload` with the error text and returns the file path.
    pub fn capture<T: Serialize>(
        &self,
        payload: &T,
        error: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<PathBuf> {
        let path = self.dir.join(format!(
            "emergency_{}_{}.json",
            now.timestamp_millis(),
            Uuid::new_v4().simple()
        ));

        let record = EmergencyRecord {
            error_message: payload,
            error,
            timestamp: now,
        };
        let data = serde_json::to_vec_pretty(&record)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClaimFields;
    use tempfile::tempdir;

    #[test]
    fn capture_writes_payload() {
        let temp = tempdir().unwrap();
        let capture = EmergencyCapture::new(temp.path());
        let fields = ClaimFields::new("A1", "X", 100.0, "d1");

        let path = capture.capture(&fields, "disk full", Utc::now()).unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();

        assert_eq!(value["error_message"]["id"], "A1");
        assert_eq!(value["error"], "disk full");
        assert!(value["timestamp"].is_string());
    }
}
