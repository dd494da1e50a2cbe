//! Error types for the HTTP server.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use claimflow_core::CoreError;
use claimflow_protocol::ProtocolError;
use claimflow_queue::QueueError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while serving a request.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Well-formed request with invalid field values.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The request body exceeded the configured limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// The addressed claim does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The claims file could not be parsed.
    #[error("claims file is corrupted")]
    CorruptStore,

    /// A commit failed.
    #[error("{0}")]
    Persistence(String),

    /// The queue did not accept a submission.
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::Validation(_)
                | ServerError::PayloadTooLarge(_)
                | ServerError::NotFound(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns the HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::CorruptStore
            | ServerError::Persistence(_)
            | ServerError::Internal(_)
            | ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreError> for ServerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ClaimNotFound { .. } => ServerError::NotFound(err.to_string()),
            CoreError::InvalidClaim { message } => ServerError::Validation(message),
            CoreError::CorruptSnapshot { .. } => ServerError::CorruptStore,
            CoreError::PersistenceFailure { .. } => ServerError::Persistence(err.to_string()),
            CoreError::Io(e) => ServerError::Io(e),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidSubmission(msg) => ServerError::Validation(msg),
            ProtocolError::Encode(msg) => ServerError::Internal(msg),
            other => ServerError::InvalidRequest(other.to_string()),
        }
    }
}

impl From<QueueError> for ServerError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Protocol(e) => e.into(),
            other => ServerError::QueueUnavailable(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection.status() {
            StatusCode::UNPROCESSABLE_ENTITY => ServerError::Validation(rejection.body_text()),
            StatusCode::PAYLOAD_TOO_LARGE => ServerError::PayloadTooLarge(rejection.body_text()),
            _ => ServerError::InvalidRequest(rejection.body_text()),
        }
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        ServerError::InvalidRequest(rejection.body_text())
    }
}
