//! Record store configuration.

/// Default number of appends between backup snapshots.
pub const DEFAULT_BACKUP_INTERVAL: u64 = 10;

/// Configuration for opening a record store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to create the data directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Every n-th successful append writes a backup of the pre-append state.
    /// Zero disables backups.
    pub backup_interval: u64,

    /// Whether to fsync the snapshot and directory on every commit.
    pub sync_on_commit: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            backup_interval: DEFAULT_BACKUP_INTERVAL,
            sync_on_commit: true,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the data directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the backup interval (0 = never).
    #[must_use]
    pub const fn backup_interval(mut self, appends: u64) -> Self {
        self.backup_interval = appends;
        self
    }

    /// Sets whether commits are fsynced.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_commit);
        assert_eq!(config.backup_interval, 10);
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new()
            .create_if_missing(false)
            .sync_on_commit(false)
            .backup_interval(0);

        assert!(!config.create_if_missing);
        assert!(!config.sync_on_commit);
        assert_eq!(config.backup_interval, 0);
    }
}
