//! Sync command implementation.

use super::{format_timestamp, open_orchestrator};
use closetsync_engine::{MergeOutcome, SyncConfig, SyncOutcome};
use std::path::Path;
use std::time::Duration;

/// Runs the sync command.
pub fn run(
    path: &Path,
    base_url: &str,
    timeout: Duration,
    api_key: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncConfig::new(base_url).with_timeout(timeout);
    let sync = open_orchestrator(path, config, api_key, true)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(sync.sync_now())?;

    let result = match outcome {
        SyncOutcome::Completed(result) => result,
        SyncOutcome::Skipped(reason) => {
            println!("sync skipped: {reason:?}");
            return Ok(());
        }
    };

    println!("Delivered:  {}", result.delivered);
    println!("Failed:     {}", result.failures.len());
    for failure in &result.failures {
        println!("  {} {}: {}", failure.operation_id, failure.kind, failure.error);
    }
    for op in sync.take_abandoned() {
        println!("  abandoned {} {} after {} attempts", op.id(), op.kind(), op.retry_count());
    }
    match &result.merge {
        MergeOutcome::Applied { replayed, .. } => {
            println!("Merged:     yes ({replayed} pending replayed)");
        }
        MergeOutcome::Skipped(e) => println!("Merged:     no ({e})"),
    }
    println!("Last sync:  {}", format_timestamp(sync.status().last_sync_timestamp));
    println!("Took:       {:?}", result.duration);

    Ok(())
}
