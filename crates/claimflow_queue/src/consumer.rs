//! Queue consumer: decodes claim messages and persists them.
//!
//! ## Delivery lifecycle
//!
//! ```text
//! Received → Deserializing → Persisting → Acknowledged
//!                 │               │
//!                 └───────────────┴──────→ NegativelyAcknowledged (requeue)
//! ```
//!
//! A message is acknowledged only after the record store committed it. Decode
//! and persistence failures are both answered with a requeueing nack, so a
//! message is retried until it succeeds (at-least-once delivery).
//!
//! Deliveries arrive on the connection's driver thread and are handed to a
//! bounded worker pool. Workers never call `basic_ack` directly: settlement is
//! scheduled back onto the driver with `add_callback_threadsafe`.

use crate::broker::{ChannelHandle, Connection, Delivery};
use crate::config::ConsumerConfig;
use crate::error::QueueResult;
use crate::pool::WorkerPool;
use chrono::{DateTime, Utc};
use claimflow_core::{ClaimFields, ClaimRecord, CoreResult, RecordStore};
use claimflow_protocol::{ClaimMessage, DEFAULT_STATUS};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const IDLE_POLL: Duration = Duration::from_millis(10);

/// Customer recorded when a message carries none.
pub const DEFAULT_CUSTOMER: &str = "John Doe";
/// Amount recorded when a message carries none.
pub const DEFAULT_AMOUNT: f64 = 500.0;
/// Description recorded when a message carries none.
pub const DEFAULT_DESCRIPTION: &str = "Car damage claim";

/// Destination for decoded claims.
///
/// Implemented by [`RecordStore`]; tests substitute failing or gated sinks.
pub trait ClaimSink: Send + Sync {
    /// Durably stores a claim.
    fn persist(&self, fields: ClaimFields) -> CoreResult<ClaimRecord>;
}

impl ClaimSink for RecordStore {
    fn persist(&self, fields: ClaimFields) -> CoreResult<ClaimRecord> {
        self.append_record(fields)
    }
}

/// Stage of a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Handed to a worker.
    Received,
    /// Decoding the envelope.
    Deserializing,
    /// Waiting on the record store.
    Persisting,
    /// Committed; ack scheduled.
    Acknowledged,
    /// Failed; nack with requeue scheduled.
    NegativelyAcknowledged,
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryState::Received => "received",
            DeliveryState::Deserializing => "deserializing",
            DeliveryState::Persisting => "persisting",
            DeliveryState::Acknowledged => "acknowledged",
            DeliveryState::NegativelyAcknowledged => "negatively_acknowledged",
        };
        f.write_str(name)
    }
}

/// Counters for a running consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Deliveries picked up by workers.
    pub received: u64,
    /// Deliveries acknowledged on the driver.
    pub acked: u64,
    /// Deliveries rejected with requeue on the driver.
    pub nacked: u64,
    /// Settlements dropped because the channel was closed.
    pub ack_skipped: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    received: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
    ack_skipped: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            received: self.received.load(Ordering::SeqCst),
            acked: self.acked.load(Ordering::SeqCst),
            nacked: self.nacked.load(Ordering::SeqCst),
            ack_skipped: self.ack_skipped.load(Ordering::SeqCst),
        }
    }
}

/// Builds claim fields from a message, defaulting missing keys.
pub fn fields_from_message(message: ClaimMessage, now: DateTime<Utc>) -> ClaimFields {
    let id = message
        .id
        .unwrap_or_else(|| format!("auto_{}", now.timestamp()));
    ClaimFields::new(
        id,
        message
            .customer
            .unwrap_or_else(|| DEFAULT_CUSTOMER.to_string()),
        message.amount.unwrap_or(DEFAULT_AMOUNT),
        message
            .description
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
    )
    .with_status(message.status.unwrap_or_else(|| DEFAULT_STATUS.to_string()))
}

/// Consumes claim messages into a [`ClaimSink`].
///
/// # Example
///
/// ```rust,ignore
/// let broker = Arc::new(MemoryBroker::new());
/// let connection = Connection::open(&broker)?;
/// let consumer = QueueConsumer::new(store, ConsumerConfig::default());
///
/// let handle = consumer.start(&connection)?;
/// // ... until shutdown is requested
/// let stats = handle.shutdown();
/// connection.close()?;
/// ```
pub struct QueueConsumer<S: ?Sized> {
    sink: Arc<S>,
    config: ConsumerConfig,
}

impl<S: ClaimSink + ?Sized + 'static> QueueConsumer<S> {
    /// Creates a consumer persisting into `sink`.
    pub fn new(sink: Arc<S>, config: ConsumerConfig) -> Self {
        Self { sink, config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Declares the queue, sets prefetch, starts workers and begins consuming.
    pub fn start(&self, connection: &Connection) -> QueueResult<ConsumerHandle> {
        let channel = connection.channel();
        let queue = self.config.queue.clone();

        channel.queue_declare(&queue)?;
        channel.basic_qos(self.config.prefetch)?;

        // Prefetch credit bounds the deliveries in flight, so with this
        // capacity the driver never blocks handing off work.
        let capacity = usize::from(self.config.prefetch.max(1));
        let (jobs, job_queue) = mpsc::sync_channel::<Delivery>(capacity);
        let stats = Arc::new(StatsCounters::default());

        let pool = {
            let sink = Arc::clone(&self.sink);
            let stats = Arc::clone(&stats);
            WorkerPool::spawn(
                "claimflow-worker",
                self.config.effective_workers(),
                job_queue,
                move |delivery: Delivery| handle_delivery(&*sink, &stats, delivery),
            )?
        };

        channel.basic_consume(&queue, move |delivery: Delivery| {
            let delivery_tag = delivery.delivery_tag;
            if jobs.send(delivery).is_err() {
                // Left unacked; closing the connection requeues it.
                warn!(delivery_tag, "worker pool is gone, delivery left unacked");
            }
        })?;

        info!(
            %queue,
            prefetch = self.config.prefetch,
            workers = pool.size(),
            "consumer started"
        );

        Ok(ConsumerHandle {
            channel,
            pool,
            stats,
            queue,
        })
    }
}

/// A running consumer.
///
/// Call [`ConsumerHandle::shutdown`] before closing the connection so
/// in-flight messages are persisted and settled.
#[derive(Debug)]
pub struct ConsumerHandle {
    channel: ChannelHandle,
    pool: WorkerPool,
    stats: Arc<StatsCounters>,
    queue: String,
}

impl ConsumerHandle {
    /// Returns the current counters.
    pub fn stats(&self) -> ConsumerStats {
        self.stats.snapshot()
    }

    /// Returns the queue being consumed.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Returns true while the underlying connection is open.
    pub fn is_connected(&self) -> bool {
        self.channel.is_open()
    }

    /// Waits until the queue holds no ready message and no
    /// delivery is outstanding, or until `timeout` passes.
    ///
    /// Returns the number of messages still queued or in flight; 0 means
    /// everything accepted so far was persisted and acknowledged. Stops early
    /// if the connection closes.
    pub fn wait_idle(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = self.channel.pending(&self.queue);
            if remaining == 0 || !self.channel.is_open() || Instant::now() >= deadline {
                debug!(queue = %self.queue, remaining, "consumer idle wait finished");
                return remaining;
            }
            thread::sleep(IDLE_POLL);
        }
    }

    /// Stops consuming, joins every worker and waits for their settlements
    /// to run on the driver.
    pub fn shutdown(self) -> ConsumerStats {
        let ConsumerHandle {
            channel,
            pool,
            stats,
            queue,
        } = self;
        info!(%queue, "stopping consumer");

        // Cancelling drops the job sender held by the driver.
        if channel.basic_cancel().is_err() {
            debug!("connection already closed, consumer was dropped with it");
        }

        let in_flight = channel.unacked_count();
        pool.join();
        drain_settlements(&channel);

        let stats = stats.snapshot();
        info!(
            in_flight,
            received = stats.received,
            acked = stats.acked,
            nacked = stats.nacked,
            ack_skipped = stats.ack_skipped,
            "consumer stopped"
        );
        stats
    }
}

/// Waits until callbacks scheduled so far have run on the driver.
fn drain_settlements(channel: &ChannelHandle) {
    let (done, wait) = mpsc::channel();
    let scheduled = channel.add_callback_threadsafe(move || {
        let _ = done.send(());
    });
    // Recv fails if the driver exits without running the marker.
    if scheduled.is_ok() {
        let _ = wait.recv();
    }
}

fn handle_delivery<S: ClaimSink + ?Sized>(sink: &S, stats: &Arc<StatsCounters>, delivery: Delivery) {
    stats.received.fetch_add(1, Ordering::SeqCst);
    let delivery_tag = delivery.delivery_tag;
    debug!(
        delivery_tag,
        redelivered = delivery.redelivered,
        state = %DeliveryState::Received
    );

    let outcome = process(sink, delivery_tag, &delivery.body);
    settle(&delivery.channel, delivery_tag, outcome, stats);
}

/// Decodes and persists one message body.
fn process<S: ClaimSink + ?Sized>(sink: &S, delivery_tag: u64, body: &[u8]) -> DeliveryState {
    debug!(delivery_tag, state = %DeliveryState::Deserializing);
    let message = match ClaimMessage::decode(body) {
        Ok(message) => message,
        Err(e) => {
            warn!(delivery_tag, error = %e, "malformed payload, requeueing");
            return DeliveryState::NegativelyAcknowledged;
        }
    };

    let fields = fields_from_message(message, Utc::now());
    debug!(delivery_tag, id = %fields.id, state = %DeliveryState::Persisting);

    match sink.persist(fields) {
        Ok(record) => {
            info!(delivery_tag, id = %record.id, index = record.index, "claim persisted");
            DeliveryState::Acknowledged
        }
        Err(e) => {
            warn!(delivery_tag, error = %e, "persistence failed, requeueing");
            DeliveryState::NegativelyAcknowledged
        }
    }
}

/// Schedules the ack or nack for a delivery on its channel's driver.
fn settle(
    channel: &ChannelHandle,
    delivery_tag: u64,
    outcome: DeliveryState,
    stats: &Arc<StatsCounters>,
) {
    if !channel.is_open() {
        debug!(delivery_tag, %outcome, "channel closed, settlement skipped");
        stats.ack_skipped.fetch_add(1, Ordering::SeqCst);
        return;
    }

    let on_driver = channel.clone();
    let counters = Arc::clone(stats);
    let scheduled = channel.add_callback_threadsafe(move || {
        let result = if outcome == DeliveryState::Acknowledged {
            on_driver
                .basic_ack(delivery_tag)
                .map(|()| &counters.acked)
        } else {
            on_driver
                .basic_nack(delivery_tag, true)
                .map(|()| &counters.nacked)
        };
        match result {
            Ok(counter) => {
                counter.fetch_add(1, Ordering::SeqCst);
                debug!(delivery_tag, state = %outcome);
            }
            Err(e) => warn!(delivery_tag, error = %e, "settlement failed"),
        }
    });

    if scheduled.is_err() {
        debug!(delivery_tag, %outcome, "channel closed, settlement skipped");
        stats.ack_skipped.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_are_defaulted() {
        let now = Utc::now();
        let fields = fields_from_message(ClaimMessage::new(), now);

        assert_eq!(fields.id, format!("auto_{}", now.timestamp()));
        assert_eq!(fields.customer, "John Doe");
        assert_eq!(fields.amount, 500.0);
        assert_eq!(fields.description, "Car damage claim");
        assert_eq!(fields.status, "Enviado");
    }

    #[test]
    fn present_keys_are_kept() {
        let message = ClaimMessage {
            id: Some("A1".into()),
            customer: Some("X".into()),
            amount: Some(100.0),
            description: Some("d1".into()),
            status: Some("Revisado".into()),
        };
        let fields = fields_from_message(message, Utc::now());
        assert_eq!(fields, ClaimFields::new("A1", "X", 100.0, "d1").with_status("Revisado"));
    }

    struct RejectingSink;

    impl ClaimSink for RejectingSink {
        fn persist(&self, _fields: ClaimFields) -> CoreResult<ClaimRecord> {
            Err(claimflow_core::CoreError::persistence_failure("disk full", None))
        }
    }

    #[test]
    fn process_outcomes() {
        let body = ClaimMessage::new().encode().unwrap();
        assert_eq!(
            process(&RejectingSink, 1, &body),
            DeliveryState::NegativelyAcknowledged
        );
        assert_eq!(
            process(&RejectingSink, 2, b"not cbor"),
            DeliveryState::NegativelyAcknowledged
        );
    }

    #[test]
    fn state_names() {
        assert_eq!(DeliveryState::Acknowledged.to_string(), "acknowledged");
        assert_eq!(
            DeliveryState::NegativelyAcknowledged.to_string(),
            "negatively_acknowledged"
        );
    }
}
