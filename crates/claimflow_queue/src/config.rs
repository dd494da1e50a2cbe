//! Consumer configuration.

/// Queue used when none is configured.
pub const DEFAULT_QUEUE: &str = "claims";

/// Default number of unacknowledged deliveries per channel.
pub const DEFAULT_PREFETCH: u16 = 10;

/// Configuration for a [`crate::QueueConsumer`].
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Queue to consume from. Declared on start.
    pub queue: String,

    /// Maximum unacknowledged deliveries (`basic_qos` prefetch count).
    pub prefetch: u16,

    /// Worker threads. Zero means one per prefetch slot.
    pub workers: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            prefetch: DEFAULT_PREFETCH,
            workers: 0,
        }
    }
}

impl ConsumerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the queue name.
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Sets the prefetch count.
    #[must_use]
    pub const fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Number of worker threads the pool actually starts.
    pub fn effective_workers(&self) -> usize {
        match (self.workers, self.prefetch) {
            (0, 0) => 1,
            (0, prefetch) => usize::from(prefetch),
            (workers, _) => workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ConsumerConfig::default();
        assert_eq!(config.queue, "claims");
        assert_eq!(config.prefetch, 10);
        assert_eq!(config.effective_workers(), 10);
    }

    #[test]
    fn builder() {
        let config = ConsumerConfig::new()
            .with_queue("inbound")
            .with_prefetch(4)
            .with_workers(2);
        assert_eq!(config.queue, "inbound");
        assert_eq!(config.prefetch, 4);
        assert_eq!(config.effective_workers(), 2);
    }

    #[test]
    fn unlimited_prefetch_still_gets_a_worker() {
        let config = ConsumerConfig::new().with_prefetch(0);
        assert_eq!(config.effective_workers(), 1);
    }
}
