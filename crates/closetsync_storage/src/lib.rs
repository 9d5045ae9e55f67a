//! # closetsync storage
//!
//! Key/value persistence backends for closetsync.
//!
//! This crate provides the lowest-level storage abstraction used by the sync
//! engine. Stores are **opaque string stores** - they do not interpret the
//! values they hold. The engine owns the serialization of the operation
//! queue, the last-sync timestamp and the profile snapshot.
//!
//! ## Design Principles
//!
//! - Stores are simple `get` / `set` / `remove` maps keyed by short names
//! - Every `set` replaces the whole value for a key
//! - Must be `Send + Sync` for concurrent access
//! - A missing key is `Ok(None)`, never an error
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral sessions
//! - [`FileStore`] - One file per key inside a locked directory
//!
//! ## Example
//!
//! ```rust
//! use closetsync_storage::{InMemoryStore, KeyValueStore};
//!
//! let store = InMemoryStore::new();
//! store.set("closetsync.last_sync", "1700000000000").unwrap();
//! assert_eq!(
//!     store.get("closetsync.last_sync").unwrap().as_deref(),
//!     Some("1700000000000")
//! );
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, KeyValueStore};
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
