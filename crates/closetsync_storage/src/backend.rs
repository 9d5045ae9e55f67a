//! Key/value store trait definition.

use crate::error::{StorageError, StorageResult};

/// A durable key/value store holding string values.
///
/// Stores are **opaque**. The sync engine writes whole serialized values
/// (the operation queue as a JSON array, the last-sync timestamp as an
/// integer) and reads them back verbatim.
///
/// # Invariants
///
/// - `get` returns exactly the value of the last successful `set`
/// - `set` replaces the value atomically; a reader never sees a partial value
/// - `remove` on a missing key succeeds
/// - Stores must be `Send + Sync` for concurrent access
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the removal fails.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Lists all keys currently present, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the key listing cannot be read.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

/// Checks that a key only uses `[A-Za-z0-9._-]` and is not empty.
///
/// Keys double as file names in [`crate::FileStore`], so the same rule
/// applies to every store.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] for a rejected key.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
