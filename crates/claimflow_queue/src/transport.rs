//! Publishing seam between producers and a broker.

use crate::broker::MemoryBroker;
use crate::error::{QueueError, QueueResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A queue transport accepts published messages for named queues.
///
/// This trait abstracts the broker, allowing the in-process
/// [`MemoryBroker`] to be replaced by a network client.
pub trait QueueTransport: Send + Sync {
    /// Declares a queue. Must be idempotent.
    fn declare_queue(&self, queue: &str) -> QueueResult<()>;

    /// Publishes a message body to a declared queue.
    fn publish(&self, queue: &str, body: Vec<u8>) -> QueueResult<()>;

    /// Checks if the transport can accept messages.
    fn is_connected(&self) -> bool;
}

impl QueueTransport for MemoryBroker {
    fn declare_queue(&self, queue: &str) -> QueueResult<()> {
        MemoryBroker::declare_queue(self, queue);
        Ok(())
    }

    fn publish(&self, queue: &str, body: Vec<u8>) -> QueueResult<()> {
        MemoryBroker::publish(self, queue, body)
    }

    fn is_connected(&self) -> bool {
        true
    }
}

impl<T: QueueTransport + ?Sized> QueueTransport for Arc<T> {
    fn declare_queue(&self, queue: &str) -> QueueResult<()> {
        (**self).declare_queue(queue)
    }

    fn publish(&self, queue: &str, body: Vec<u8>) -> QueueResult<()> {
        (**self).publish(queue, body)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// A transport that can be switched off, for testing publish failures.
#[derive(Debug)]
pub struct SwitchableTransport<T> {
    inner: T,
    connected: AtomicBool,
}

impl<T: QueueTransport> SwitchableTransport<T> {
    /// Wraps a transport, initially connected.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            connected: AtomicBool::new(true),
        }
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns the wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: QueueTransport> QueueTransport for SwitchableTransport<T> {
    fn declare_queue(&self, queue: &str) -> QueueResult<()> {
        if !self.is_connected() {
            return Err(QueueError::ConnectionClosed);
        }
        self.inner.declare_queue(queue)
    }

    fn publish(&self, queue: &str, body: Vec<u8>) -> QueueResult<()> {
        if !self.is_connected() {
            return Err(QueueError::ConnectionClosed);
        }
        self.inner.publish(queue, body)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.inner.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_through_trait() {
        let broker = Arc::new(MemoryBroker::new());
        let transport: &dyn QueueTransport = &broker;

        transport.declare_queue("claims").unwrap();
        transport.declare_queue("claims").unwrap();
        transport.publish("claims", vec![1, 2, 3]).unwrap();

        assert!(transport.is_connected());
        assert_eq!(broker.len("claims"), 1);
    }

    #[test]
    fn switched_off_transport_refuses() {
        let transport = SwitchableTransport::new(MemoryBroker::new());
        transport.declare_queue("claims").unwrap();

        transport.set_connected(false);
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.publish("claims", vec![1]),
            Err(QueueError::ConnectionClosed)
        ));
        assert!(transport.inner().is_empty("claims"));
    }
}
