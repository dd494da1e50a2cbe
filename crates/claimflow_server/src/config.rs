//! Server configuration.

use claimflow_queue::DEFAULT_QUEUE;
use std::net::SocketAddr;

/// Default request body limit for submissions and status updates.
pub const DEFAULT_MAX_BODY_SIZE: usize = 64 * 1024;

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Queue that submissions are published to.
    pub queue: String,
    /// Maximum accepted request body, in bytes.
    pub max_body_size: usize,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            queue: DEFAULT_QUEUE.to_string(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Sets the submission queue.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Sets the maximum request body size.
    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8000)))
    }
}
