//! # Claimflow Queue
//!
//! Asynchronous claim ingestion for Claimflow.
//!
//! This crate provides:
//! - An in-process broker with AMQP-style channels (prefetch, delivery tags,
//!   ack / nack with requeue, redelivery on connection loss)
//! - A queue consumer that persists claims with at-least-once delivery
//! - A queue producer over a pluggable transport
//!
//! ## Threading
//!
//! Each [`Connection`] runs one driver thread that owns delivery and protocol
//! state. The consumer hands deliveries to a worker pool sized to the prefetch
//! credit; workers settle messages by scheduling callbacks back onto the
//! driver, never by calling into the channel directly.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod broker;
mod config;
mod consumer;
mod error;
mod pool;
mod producer;
mod transport;

pub use broker::{ChannelHandle, Connection, Delivery, MemoryBroker};
pub use config::{ConsumerConfig, DEFAULT_PREFETCH, DEFAULT_QUEUE};
pub use consumer::{
    fields_from_message, ClaimSink, ConsumerHandle, ConsumerStats, DeliveryState, QueueConsumer,
    DEFAULT_AMOUNT, DEFAULT_CUSTOMER, DEFAULT_DESCRIPTION,
};
pub use error::{QueueError, QueueResult};
pub use pool::WorkerPool;
pub use producer::QueueProducer;
pub use transport::{QueueTransport, SwitchableTransport};
