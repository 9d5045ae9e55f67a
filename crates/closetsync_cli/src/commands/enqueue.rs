//! Enqueue command implementation.

use super::{open_orchestrator, CliError};
use closetsync_engine::{SyncConfig, SyncError};
use closetsync_protocol::{Mutation, OperationId, OperationKind};
use serde_json::Value;
use std::path::Path;
use tracing::info;

/// Runs the enqueue command.
pub fn run(path: &Path, kind: &str, payload: &str) -> Result<(), Box<dyn std::error::Error>> {
    let id = enqueue(path, kind, payload)?;
    println!("queued {id}");
    Ok(())
}

/// Decodes a raw operation and queues it for the signed-in user.
pub fn enqueue(
    path: &Path,
    kind: &str,
    payload: &str,
) -> Result<OperationId, Box<dyn std::error::Error>> {
    let kind: OperationKind = kind.parse()?;
    let payload: Value = serde_json::from_str(payload)?;
    let mutation = Mutation::decode(kind, &payload)?;

    let sync = open_orchestrator(path, SyncConfig::default(), None, false)?;
    let id = sync.enqueue(mutation).map_err(|e| match e {
        SyncError::NotAuthenticated => Box::new(CliError::NotSignedIn) as Box<dyn std::error::Error>,
        other => Box::new(other),
    })?;

    info!(operation_id = %id, kind = %kind, "operation queued");
    Ok(id)
}
