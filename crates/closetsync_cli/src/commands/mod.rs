//! CLI command implementations.

pub mod enqueue;
pub mod login;
pub mod queue;
pub mod status;
pub mod sync;

use closetsync_engine::{
    ConnectivityMonitor, HttpProfileService, NetworkClient, ReqwestClient, StoredProfileStore,
    SyncConfig, SyncOrchestrator,
};
use closetsync_storage::FileStore;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors specific to the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// No profile snapshot in the store.
    #[error("no user signed in; run `closetsync login --user <ID>` first")]
    NotSignedIn,

    /// Unsupported `--format` value.
    #[error("unknown output format {0:?} (expected text or json)")]
    UnknownFormat(String),
}

/// Output format of inspection commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl Format {
    /// Parses a `--format` value.
    pub fn parse(format: &str) -> Result<Self, CliError> {
        match format {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(CliError::UnknownFormat(other.to_string())),
        }
    }
}

/// Orchestrator over a store directory and a REST server.
pub type CliOrchestrator = SyncOrchestrator<
    FileStore,
    HttpProfileService<ReqwestClient, ConnectivityMonitor>,
    StoredProfileStore<FileStore>,
>;

/// Opens the store directory, creating it if needed.
pub fn open_store(path: &Path) -> Result<Arc<FileStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(FileStore::open(path)?))
}

/// Wires an orchestrator over the store at `path`.
///
/// With `online` false no request is ever sent.
pub fn open_orchestrator(
    path: &Path,
    config: SyncConfig,
    api_key: Option<&str>,
    online: bool,
) -> Result<CliOrchestrator, Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let profiles = Arc::new(StoredProfileStore::open(Arc::clone(&store)));
    let connectivity = ConnectivityMonitor::new(online);

    let mut client = ReqwestClient::new()?;
    if let Some(api_key) = api_key {
        client = client.with_api_key(api_key);
    }
    let network = NetworkClient::new(client, connectivity.clone());
    let remote = Arc::new(HttpProfileService::new(&config, network)?);

    Ok(SyncOrchestrator::new(
        config,
        store,
        remote,
        profiles,
        connectivity,
    ))
}

/// Formats an epoch-millisecond timestamp for text output.
pub fn format_timestamp(timestamp: Option<i64>) -> String {
    match timestamp {
        Some(ms) => format!("{ms} (epoch ms)"),
        None => "never".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!(Format::parse("json").unwrap(), Format::Json);
        assert_eq!(Format::parse("text").unwrap(), Format::Text);
        assert!(matches!(
            Format::parse("yaml"),
            Err(CliError::UnknownFormat(_))
        ));
    }

    #[test]
    fn formats_timestamps() {
        assert_eq!(format_timestamp(None), "never");
        assert!(format_timestamp(Some(5)).starts_with('5'));
    }
}
