//! Serve command implementation.
//!
//! Shutdown order: stop accepting HTTP requests, let the consumer empty the
//! queue (bounded by the drain timeout), stop the consumer, then close the
//! queue connection. The broker lives in this process, so anything still
//! queued when it is dropped is lost and reported at error level.

use claimflow_core::{RecordStore, StoreConfig};
use claimflow_queue::{
    ChannelHandle, Connection, ConsumerConfig, MemoryBroker, QueueConsumer, QueueError,
    QueueTransport,
};
use claimflow_server::{ClaimServer, ServerConfig};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const CONNECTION_POLL: Duration = Duration::from_millis(500);

/// Options for the serve command.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// HTTP bind address.
    pub bind: SocketAddr,
    /// Submission queue.
    pub queue: String,
    /// Prefetch credit.
    pub prefetch: u16,
    /// Worker threads, 0 for one per prefetch slot.
    pub workers: usize,
    /// How long shutdown waits for queued claims to be persisted.
    pub drain_timeout: Duration,
}

/// Runs the pipeline until Ctrl-C or until the queue connection is lost.
pub fn run(path: &Path, options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(RecordStore::open(path, StoreConfig::default())?);
    if store.recovered_from_corruption() {
        warn!(path = ?path, "store started empty after a corrupted snapshot was set aside");
    }
    info!(
        path = ?path,
        records = store.read_all().len(),
        "store opened"
    );

    let broker = Arc::new(MemoryBroker::new());
    broker.declare_queue(&options.queue);
    let connection = Connection::open(&broker)?;

    let consumer_config = ConsumerConfig::default()
        .with_queue(options.queue.clone())
        .with_prefetch(options.prefetch)
        .with_workers(options.workers);
    let consumer = QueueConsumer::new(Arc::clone(&store), consumer_config).start(&connection)?;

    let transport: Arc<dyn QueueTransport> = broker.clone();
    let server_config = ServerConfig::new(options.bind).with_queue(options.queue.clone());
    let server = ClaimServer::new(server_config, Arc::clone(&store), transport);

    let connection_lost = Arc::new(AtomicBool::new(false));
    let shutdown = shutdown_signal(connection.channel(), Arc::clone(&connection_lost));

    let runtime = tokio::runtime::Runtime::new()?;
    let served = runtime.block_on(server.serve(shutdown));

    // HTTP no longer accepts submissions; persist what it already accepted.
    let remaining = consumer.wait_idle(options.drain_timeout);
    if remaining > 0 {
        error!(
            queue = %options.queue,
            remaining,
            "accepted claims were not persisted before shutdown and are lost"
        );
    }

    let stats = consumer.shutdown();
    info!(
        received = stats.received,
        acked = stats.acked,
        nacked = stats.nacked,
        ack_skipped = stats.ack_skipped,
        "consumer stopped"
    );
    if let Err(e) = connection.close() {
        warn!(error = %e, "queue connection did not close cleanly");
    }

    served?;
    if connection_lost.load(Ordering::SeqCst) {
        return Err(QueueError::ConnectionClosed.into());
    }
    Ok(())
}

/// Resolves on Ctrl-C, or when the consumer channel closes underneath us.
async fn shutdown_signal(channel: ChannelHandle, lost: Arc<AtomicBool>) {
    let watch = async {
        while channel.is_open() {
            tokio::time::sleep(CONNECTION_POLL).await;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "failed to listen for Ctrl-C");
            }
            info!("shutdown requested");
        }
        () = watch => {
            error!("queue connection lost");
            lost.store(true, Ordering::SeqCst);
        }
    }
}
