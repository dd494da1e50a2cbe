//! Error types for the queue envelope.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding claim messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// The body is not a well-formed claim envelope.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The envelope carries a schema version this build does not understand.
    #[error("unsupported message version {0}")]
    UnsupportedVersion(i128),

    /// A submission failed validation before being enqueued.
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    /// CBOR encoding failed.
    #[error("encode error: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Creates a malformed payload error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload(message.into())
    }

    /// Returns true if the error came from an inbound body.
    ///
    /// These are the errors a consumer answers with a requeue.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::MalformedPayload(_) | ProtocolError::UnsupportedVersion(_)
        )
    }
}
