//! Local profile snapshot stores.

use crate::config::PROFILE_KEY;
use closetsync_protocol::UserProfile;
use closetsync_storage::KeyValueStore;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;

/// Holder of the local profile snapshot the UI renders from.
pub trait ProfileStore: Send + Sync {
    /// Returns the current snapshot, or `None` when no user is signed in.
    fn current_profile(&self) -> Option<UserProfile>;

    /// Replaces the current snapshot.
    fn replace_profile(&self, profile: UserProfile);
}

/// In-memory profile store.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profile: RwLock<Option<UserProfile>>,
}

impl MemoryProfileStore {
    /// Creates an empty store (signed out).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding a profile.
    pub fn with_profile(profile: UserProfile) -> Self {
        Self {
            profile: RwLock::new(Some(profile)),
        }
    }

    /// Drops the current profile (sign out).
    pub fn clear(&self) {
        *self.profile.write() = None;
    }
}

impl ProfileStore for MemoryProfileStore {
    fn current_profile(&self) -> Option<UserProfile> {
        self.profile.read().clone()
    }

    fn replace_profile(&self, profile: UserProfile) {
        *self.profile.write() = Some(profile);
    }
}

/// Profile store that keeps the snapshot in a [`KeyValueStore`].
///
/// Reads are served from a cached copy. Write failures are logged and the
/// cached copy is still updated.
pub struct StoredProfileStore<S> {
    store: Arc<S>,
    key: String,
    cached: RwLock<Option<UserProfile>>,
}

impl<S: KeyValueStore> StoredProfileStore<S> {
    /// Opens the snapshot stored under the default key.
    pub fn open(store: Arc<S>) -> Self {
        Self::open_with_key(store, PROFILE_KEY)
    }

    /// Opens the snapshot stored under `key`.
    ///
    /// Unreadable content is treated as signed out.
    pub fn open_with_key(store: Arc<S>, key: impl Into<String>) -> Self {
        let key = key.into();
        let cached: Option<UserProfile> = match store.get(&key) {
            Ok(Some(text)) => serde_json::from_str(&text)
                .map_err(|e| warn!(key = %key, error = %e, "discarding corrupt profile snapshot"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to read profile snapshot");
                None
            }
        };

        Self {
            store,
            key,
            cached: RwLock::new(cached),
        }
    }

    /// Removes the snapshot (sign out).
    pub fn clear(&self) {
        *self.cached.write() = None;
        if let Err(e) = self.store.remove(&self.key) {
            warn!(key = %self.key, error = %e, "failed to remove profile snapshot");
        }
    }
}

impl<S: KeyValueStore> ProfileStore for StoredProfileStore<S> {
    fn current_profile(&self) -> Option<UserProfile> {
        self.cached.read().clone()
    }

    fn replace_profile(&self, profile: UserProfile) {
        match serde_json::to_string(&profile) {
            Ok(text) => {
                if let Err(e) = self.store.set(&self.key, &text) {
                    warn!(key = %self.key, error = %e, "failed to persist profile snapshot");
                }
            }
            Err(e) => warn!(key = %self.key, error = %e, "failed to encode profile snapshot"),
        }
        *self.cached.write() = Some(profile);
    }
}

impl<P: ProfileStore + ?Sized> ProfileStore for Arc<P> {
    fn current_profile(&self) -> Option<UserProfile> {
        (**self).current_profile()
    }

    fn replace_profile(&self, profile: UserProfile) {
        (**self).replace_profile(profile)
    }
}
