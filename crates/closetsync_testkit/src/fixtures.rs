//! Test fixtures and orchestrator helpers.
//!
//! Provides sample snapshots and a fully wired [`SyncOrchestrator`] backed
//! by [`MockProfileService`] for end-to-end scenarios.

use closetsync_engine::{
    ConnectivityMonitor, MemoryProfileStore, MockProfileService, SyncConfig, SyncOrchestrator,
};
use closetsync_protocol::{ClosetItem, Timestamp, UserProfile};
use closetsync_storage::{FileStore, InMemoryStore, KeyValueStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Creates a closet item with a fixed category.
pub fn sample_item(id: &str, date_added: Timestamp) -> ClosetItem {
    ClosetItem::new(id, "tops", date_added).with_color("black")
}

/// Creates a profile holding the given closet items.
pub fn sample_profile(user_id: &str, last_active: Timestamp, item_ids: &[&str]) -> UserProfile {
    let mut profile = UserProfile::new(user_id, last_active);
    profile.closet = item_ids
        .iter()
        .map(|id| sample_item(id, last_active))
        .collect();
    profile
}

/// A signed-in orchestrator wired to an in-memory server.
pub struct TestSync<S> {
    /// The orchestrator under test.
    pub sync: Arc<SyncOrchestrator<S, MockProfileService, MemoryProfileStore>>,
    /// The scripted server.
    pub remote: Arc<MockProfileService>,
    /// The local snapshot store.
    pub profiles: Arc<MemoryProfileStore>,
    /// Connectivity switch.
    pub connectivity: ConnectivityMonitor,
    /// Backing key-value store.
    pub store: Arc<S>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

/// Config with a long timer so only explicit triggers run cycles.
pub fn test_config() -> SyncConfig {
    SyncConfig::default().with_sync_interval(Duration::from_secs(3600))
}

impl TestSync<InMemoryStore> {
    /// Creates a harness backed by an in-memory store.
    pub fn in_memory(user_id: &str, online: bool) -> Self {
        Self::build(Arc::new(InMemoryStore::new()), user_id, online, None)
    }
}

impl TestSync<FileStore> {
    /// Creates a harness backed by a store in a fresh temporary directory.
    pub fn on_disk(user_id: &str, online: bool) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(temp_dir.path()).expect("Failed to open file store");
        Self::build(Arc::new(store), user_id, online, Some(temp_dir))
    }
}

impl<S: KeyValueStore> TestSync<S> {
    fn build(store: Arc<S>, user_id: &str, online: bool, temp_dir: Option<TempDir>) -> Self {
        let remote = Arc::new(MockProfileService::new());
        remote.set_profile(UserProfile::new(user_id, 0));
        let profiles = Arc::new(MemoryProfileStore::with_profile(UserProfile::new(user_id, 0)));
        let connectivity = ConnectivityMonitor::new(online);
        let sync = Arc::new(SyncOrchestrator::new(
            test_config(),
            Arc::clone(&store),
            Arc::clone(&remote),
            Arc::clone(&profiles),
            connectivity.clone(),
        ));

        Self {
            sync,
            remote,
            profiles,
            connectivity,
            store,
            _temp_dir: temp_dir,
        }
    }

    /// Builds a second orchestrator over the same store and server, as after
    /// an app restart.
    pub fn restart(&self) -> SyncOrchestrator<S, MockProfileService, MemoryProfileStore> {
        SyncOrchestrator::new(
            test_config(),
            Arc::clone(&self.store),
            Arc::clone(&self.remote),
            Arc::clone(&self.profiles),
            self.connectivity.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use closetsync_engine::ProfileStore;

    #[test]
    fn sample_profile_has_items() {
        let profile = sample_profile("u", 5, &["a", "b"]);
        assert_eq!(profile.closet.len(), 2);
        assert_eq!(profile.closet[1].date_added, 5);
    }

    #[test]
    fn harness_starts_signed_in() {
        let harness = TestSync::in_memory("u1", true);
        assert_eq!(harness.profiles.current_profile().unwrap().user_id, "u1");
        assert!(harness.sync.status().is_online);
        assert!(harness.remote.profile("u1").is_some());
    }

    #[test]
    fn restart_sees_queued_operations() {
        let harness = TestSync::on_disk("u1", false);
        harness.sync.enqueue_like("x").unwrap();
        assert_eq!(harness.restart().status().pending_count, 1);
    }
}
