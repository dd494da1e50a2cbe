//! # Claimflow Server
//!
//! HTTP surface for Claimflow.
//!
//! This crate provides:
//! - `POST /api`, which validates a submission and publishes it to the
//!   claims queue
//! - Read endpoints over the record store (listing, search, lookup,
//!   status history, statistics)
//! - `PUT` / `PATCH /claims/{id}/status` for status mutations
//!
//! # Architecture
//!
//! The server never writes claims itself on the submission path; the queue
//! consumer does. Status updates share the store's writer with the consumer,
//! so the two never lose each other's commits. Store calls that may block run
//! on tokio's blocking pool.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod routes;
mod server;

pub use config::{ServerConfig, DEFAULT_MAX_BODY_SIZE};
pub use error::{ServerError, ServerResult};
pub use handler::{
    HandlerContext, HealthReport, RequestHandler, ServiceBanner, StatusBody,
    StatusUpdateResponse, SubmitResponse, SERVICE_NAME,
};
pub use routes::router;
pub use server::ClaimServer;
