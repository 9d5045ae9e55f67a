//! Status command implementation.

use super::{format_timestamp, open_orchestrator, Format};
use closetsync_engine::{ProfileStore, SyncConfig};
use serde::Serialize;
use std::path::Path;

/// Store status for output.
#[derive(Debug, Serialize)]
pub struct StatusInfo {
    /// Signed-in user, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Queued operations.
    pub pending_count: usize,
    /// Last successful merge, epoch ms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_timestamp: Option<i64>,
    /// Closet size of the local snapshot.
    pub closet_items: usize,
}

/// Runs the status command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let format = Format::parse(format)?;
    let info = collect(path)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        Format::Text => {
            println!("closetsync store: {}", path.display());
            println!("{}", "=".repeat(40));
            println!(
                "User:          {}",
                info.user_id.as_deref().unwrap_or("(signed out)")
            );
            println!("Pending ops:   {}", info.pending_count);
            println!("Closet items:  {}", info.closet_items);
            println!("Last sync:     {}", format_timestamp(info.last_sync_timestamp));
        }
    }

    Ok(())
}

/// Gathers the status of the store at `path`.
pub fn collect(path: &Path) -> Result<StatusInfo, Box<dyn std::error::Error>> {
    let sync = open_orchestrator(path, SyncConfig::default(), None, false)?;
    let status = sync.status();
    let profile = sync.profiles().current_profile();

    Ok(StatusInfo {
        user_id: profile.as_ref().map(|p| p.user_id.clone()),
        pending_count: status.pending_count,
        last_sync_timestamp: status.last_sync_timestamp,
        closet_items: profile.map(|p| p.closet.len()).unwrap_or(0),
    })
}
