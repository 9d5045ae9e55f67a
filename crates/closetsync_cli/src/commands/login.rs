//! Login command implementation.

use super::open_store;
use closetsync_engine::{ProfileStore, StoredProfileStore};
use closetsync_protocol::{current_timestamp, UserProfile};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Runs the login command.
///
/// Keeps the existing snapshot when the same user signs in again.
pub fn run(path: &Path, user_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let profiles = StoredProfileStore::open(Arc::clone(&store));

    match profiles.current_profile() {
        Some(profile) if profile.user_id == user_id => {
            println!("{user_id} is already signed in");
        }
        previous => {
            if let Some(profile) = previous {
                warn!(previous = %profile.user_id, "replacing the snapshot of another user");
            }
            profiles.replace_profile(UserProfile::new(user_id, current_timestamp()));
            println!("signed in as {user_id}");
        }
    }

    Ok(())
}
