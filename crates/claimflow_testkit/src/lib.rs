//! # Claimflow Testkit
//!
//! Test utilities for Claimflow.
//!
//! This crate provides:
//! - Temporary record stores and sample claims
//! - Property-based generators using proptest
//! - Concurrent writer stress runs
//! - Crash simulation against the store directory
//!
//! ## Usage
//!
//! ```rust,ignore
//! use claimflow_testkit::prelude::*;
//!
//! #[test]
//! fn appends_land() {
//!     with_temp_store(|store| {
//!         store.append_record(sample_claim(0)).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
