//! Queue producer: encodes submissions and publishes them.

use crate::error::{QueueError, QueueResult};
use crate::transport::QueueTransport;
use claimflow_protocol::{ClaimMessage, ClaimSubmission};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Publishes claims to one queue over a [`QueueTransport`].
///
/// The queue is declared on first use. Publishing returns once the broker
/// accepted the message; it does not wait for the consumer to persist it.
#[derive(Debug)]
pub struct QueueProducer<T> {
    transport: T,
    queue: String,
    declared: AtomicBool,
}

impl<T: QueueTransport> QueueProducer<T> {
    /// Creates a producer for `queue`.
    pub fn new(transport: T, queue: impl Into<String>) -> Self {
        Self {
            transport,
            queue: queue.into(),
            declared: AtomicBool::new(false),
        }
    }

    /// Returns the target queue name.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Validates and publishes a submission.
    pub fn publish(&self, submission: &ClaimSubmission) -> QueueResult<()> {
        submission.validate()?;
        self.publish_message(&ClaimMessage::from(submission.clone()))
    }

    /// Publishes a message as is.
    pub fn publish_message(&self, message: &ClaimMessage) -> QueueResult<()> {
        if !self.transport.is_connected() {
            return Err(QueueError::ConnectionClosed);
        }

        let body = message.encode()?;
        self.ensure_declared()?;
        let size = body.len();
        self.transport.publish(&self.queue, body)?;

        debug!(queue = %self.queue, id = ?message.id, size, "claim published");
        Ok(())
    }

    fn ensure_declared(&self) -> QueueResult<()> {
        if !self.declared.load(Ordering::Acquire) {
            // Declaring twice under a race is harmless.
            self.transport.declare_queue(&self.queue)?;
            self.declared.store(true, Ordering::Release);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::transport::SwitchableTransport;
    use claimflow_protocol::ProtocolError;
    use std::sync::Arc;

    #[test]
    fn declares_on_first_publish() {
        let broker = Arc::new(MemoryBroker::new());
        let producer = QueueProducer::new(Arc::clone(&broker), "claims");

        producer
            .publish(&ClaimSubmission::new("A1", "X", 100.0, "d1"))
            .unwrap();
        producer
            .publish(&ClaimSubmission::new("A2", "X", 100.0, "d2"))
            .unwrap();

        assert_eq!(broker.len("claims"), 2);
    }

    #[test]
    fn published_body_decodes() {
        let broker = Arc::new(MemoryBroker::new());
        let producer = QueueProducer::new(Arc::clone(&broker), "claims");
        producer
            .publish(&ClaimSubmission::new("A1", "X", 100.0, "d1"))
            .unwrap();

        let connection = crate::broker::Connection::open(&broker).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        connection
            .channel()
            .basic_consume("claims", move |d| tx.send(d.body.clone()).unwrap())
            .unwrap();
        let body = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();

        let message = ClaimMessage::decode(&body).unwrap();
        assert_eq!(message.id.as_deref(), Some("A1"));
        assert_eq!(message.status.as_deref(), Some("Enviado"));
    }

    #[test]
    fn invalid_submission_not_published() {
        let broker = Arc::new(MemoryBroker::new());
        let producer = QueueProducer::new(Arc::clone(&broker), "claims");

        let result = producer.publish(&ClaimSubmission::new("", "X", 1.0, "d"));
        assert!(matches!(
            result,
            Err(QueueError::Protocol(ProtocolError::InvalidSubmission(_)))
        ));
        assert!(broker.is_empty("claims"));
    }

    #[test]
    fn disconnected_transport_fails() {
        let transport = SwitchableTransport::new(MemoryBroker::new());
        transport.set_connected(false);
        let producer = QueueProducer::new(transport, "claims");

        let result = producer.publish(&ClaimSubmission::new("A1", "X", 1.0, "d"));
        assert!(matches!(result, Err(QueueError::ConnectionClosed)));
    }
}
