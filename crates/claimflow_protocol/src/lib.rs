//! # Claimflow Protocol
//!
//! Message types carried through the Claimflow ingestion queue.
//!
//! This crate provides:
//! - `ClaimMessage`, the versioned CBOR envelope consumed from the queue
//! - `ClaimSubmission`, the validated payload accepted over HTTP
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
mod message;
mod submission;

pub use error::{ProtocolError, ProtocolResult};
pub use message::{ClaimMessage, PROTOCOL_VERSION};
pub use submission::{ClaimSubmission, DEFAULT_STATUS};
