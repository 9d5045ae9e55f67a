//! # closetsync testkit
//!
//! Test utilities for closetsync.
//!
//! This crate provides:
//! - Property-based test generators using proptest
//! - Sample profiles and a ready-wired orchestrator harness
//!
//! ## Usage
//!
//! ```rust,ignore
//! use closetsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn drains_after_reconnect() {
//!     let harness = TestSync::in_memory("u1", false);
//!     harness.sync.enqueue_like("item").unwrap();
//!     harness.connectivity.set_online(true);
//!     // ...
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
