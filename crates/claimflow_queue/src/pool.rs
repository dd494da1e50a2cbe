//! Fixed-size worker pool fed by a channel.

use crate::error::QueueResult;
use parking_lot::Mutex;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Worker threads pulling jobs from a shared receiver.
///
/// Workers exit once every sender for the job channel has been dropped and
/// the queued jobs are drained.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers running `handler` on every job from `jobs`.
    pub fn spawn<T, F>(name: &str, size: usize, jobs: Receiver<T>, handler: F) -> QueueResult<Self>
    where
        T: Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let jobs = Arc::new(Mutex::new(jobs));
        let handler = Arc::new(handler);
        let mut workers = Vec::with_capacity(size);

        for n in 0..size {
            let jobs = Arc::clone(&jobs);
            let handler = Arc::clone(&handler);
            let worker = thread::Builder::new()
                .name(format!("{name}-{n}"))
                .spawn(move || loop {
                    // Only one worker waits in recv at a time.
                    let job = jobs.lock().recv();
                    match job {
                        Ok(job) => handler(job),
                        Err(_) => break,
                    }
                })?;
            workers.push(worker);
        }

        debug!(name, size, "worker pool started");
        Ok(Self { workers })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Waits for every worker to exit and returns how many panicked.
    pub fn join(self) -> usize {
        let mut panicked = 0;
        for worker in self.workers {
            if worker.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            error!(panicked, "worker threads panicked");
        }
        panicked
    }
}
