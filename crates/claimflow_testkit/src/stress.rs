//! Stress runs with concurrent writers against one store.

use crate::fixtures::sample_claim;
use claimflow_core::{HistoryMode, RecordStore};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Threads appending sample claims.
    pub appenders: usize,
    /// Appends per appender thread.
    pub appends_per_thread: usize,
    /// Threads updating the status of existing claims.
    pub updaters: usize,
    /// Updates per updater thread.
    pub updates_per_thread: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            appenders: 4,
            appends_per_thread: 50,
            updaters: 2,
            updates_per_thread: 50,
        }
    }
}

/// Runs appenders and tracked status updaters against `store` at once.
///
/// Updaters cycle over the ids `C0..C{seed}` which must already exist.
pub fn stress_concurrent_writers(
    store: &Arc<RecordStore>,
    config: &StressConfig,
    seed: usize,
) -> StressTestResult {
    let barrier = Arc::new(Barrier::new(config.appenders + config.updaters));
    let start = Instant::now();
    let mut handles = Vec::new();

    for t in 0..config.appenders {
        let store = Arc::clone(store);
        let barrier = Arc::clone(&barrier);
        let count = config.appends_per_thread;
        handles.push(thread::spawn(move || {
            barrier.wait();
            let mut ok = 0;
            for i in 0..count {
                let n = seed + t * count + i;
                if store.append_record(sample_claim(n)).is_ok() {
                    ok += 1;
                }
            }
            (ok, count - ok)
        }));
    }

    for t in 0..config.updaters {
        let store = Arc::clone(store);
        let barrier = Arc::clone(&barrier);
        let count = config.updates_per_thread;
        handles.push(thread::spawn(move || {
            barrier.wait();
            let mut ok = 0;
            for i in 0..count {
                let id = format!("C{}", (t + i) % seed.max(1));
                let status = format!("S{t}-{i}");
                if store
                    .update_status(&id, &status, HistoryMode::Track)
                    .is_ok()
                {
                    ok += 1;
                }
            }
            (ok, count - ok)
        }));
    }

    let (mut successful, mut failed) = (0, 0);
    for handle in handles {
        let (ok, err) = handle.join().expect("stress thread panicked");
        successful += ok;
        failed += err;
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::scenarios::populated_store;

    #[test]
    fn no_write_is_lost_under_contention() {
        let seed = 5;
        let test_store = populated_store(seed);
        let config = StressConfig {
            appenders: 4,
            appends_per_thread: 20,
            updaters: 3,
            updates_per_thread: 20,
        };

        let result = stress_concurrent_writers(&test_store.shared(), &config, seed);
        result.print_summary("concurrent writers");

        assert_eq!(result.failed_ops, 0);
        let on_disk = test_store.read_disk().unwrap();
        assert_eq!(on_disk.len(), seed + 4 * 20);
        on_disk.check_invariants().unwrap();

        let history_entries: usize = on_disk.claims.iter().map(|c| c.history().len()).sum();
        assert_eq!(history_entries, 3 * 20);
    }
}
