//! Error types for queue transport and consumption.

use claimflow_protocol::ProtocolError;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur while talking to the queue.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The connection (and every channel on it) is closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Publishing to a queue that was never declared.
    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    /// Ack or nack for a tag that is not outstanding on the channel.
    #[error("unknown delivery tag {0}")]
    UnknownDeliveryTag(u64),

    /// A channel operation was called off the connection's driver thread.
    #[error("{0} must run on the connection driver thread")]
    WrongThread(&'static str),

    /// A connection driver thread panicked.
    #[error("connection driver panicked")]
    DriverPanicked,

    /// Encoding or validating a message failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Spawning a driver or worker thread failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl QueueError {
    /// Returns true if the error means the connection is gone.
    ///
    /// These errors end the consumer; everything else is local to one call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, QueueError::ConnectionClosed | QueueError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(QueueError::ConnectionClosed.is_fatal());
        assert!(!QueueError::UnknownDeliveryTag(4).is_fatal());
        assert!(!QueueError::UnknownQueue("claims".into()).is_fatal());
    }

    #[test]
    fn protocol_errors_convert() {
        let err: QueueError = ProtocolError::malformed("expected map").into();
        assert!(matches!(err, QueueError::Protocol(_)));
        assert_eq!(
            err.to_string(),
            "protocol error: malformed payload: expected map"
        );
    }
}
