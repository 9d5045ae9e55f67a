//! Queue dump command implementation.

use super::{open_orchestrator, Format};
use closetsync_engine::SyncConfig;
use std::path::Path;

/// Runs the queue command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let format = Format::parse(format)?;
    let sync = open_orchestrator(path, SyncConfig::default(), None, false)?;
    let operations = sync.pending_operations();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&operations)?),
        Format::Text => {
            println!("{} queued operation(s)", operations.len());
            for op in &operations {
                println!(
                    "{}  {:<22} user={} retries={} payload={}",
                    op.id(),
                    op.kind().as_str(),
                    op.user_id(),
                    op.retry_count(),
                    op.payload()
                );
            }
        }
    }

    Ok(())
}
