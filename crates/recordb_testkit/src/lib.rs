//! # recordb Testkit
//!
//! Test utilities for recordb.
//!
//! This crate provides:
//! - Test fixtures and store helpers
//! - Property-based test generators using proptest
//! - Crash simulation for restart and recovery tests
//!
//! ## Usage
//!
//! ```rust
//! use recordb_testkit::prelude::*;
//!
//! with_temp_store(|store| {
//!     let key = store.entities().create("user", b"alice").unwrap();
//!     assert_eq!(key.id(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
