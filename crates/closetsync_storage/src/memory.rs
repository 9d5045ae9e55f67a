//! In-memory key/value store for testing.

use crate::backend::{validate_key, KeyValueStore};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory key/value store.
///
/// This store keeps all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Sessions that don't need to survive a restart
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use closetsync_storage::{InMemoryStore, KeyValueStore};
///
/// let store = InMemoryStore::new();
/// store.set("key", "value").unwrap();
/// assert_eq!(store.keys().unwrap(), vec!["key".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing entries.
    ///
    /// Useful for testing recovery from corrupt or stale values.
    #[must_use]
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Clears all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        validate_key(key)?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}
