//! closetsync CLI
//!
//! Command-line tools for inspecting and driving a closetsync store.
//!
//! # Commands
//!
//! - `status` - Show the signed-in user, queue size and last sync time
//! - `queue` - Dump queued operations
//! - `enqueue` - Queue a raw operation for the signed-in user
//! - `login` - Seed a profile snapshot for a user
//! - `sync` - Run one drain-then-merge cycle against a server

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// closetsync command-line tools.
#[derive(Parser)]
#[command(name = "closetsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the signed-in user, queue size and last sync time
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump queued operations
    Queue {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Queue a raw operation for the signed-in user
    Enqueue {
        /// Operation kind (e.g. ADD_LIKED_ITEM)
        #[arg(short, long)]
        kind: String,

        /// JSON payload
        #[arg(short, long)]
        payload: String,
    },

    /// Seed a profile snapshot for a user
    Login {
        /// User id
        #[arg(short, long)]
        user: String,
    },

    /// Run one sync cycle against a server
    Sync {
        /// Server base URL
        #[arg(short, long)]
        base_url: String,

        /// Per-request timeout in milliseconds
        #[arg(short, long, default_value = "10000")]
        timeout_ms: u64,

        /// API key sent as X-API-Key
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Status { format } => {
            let path = cli.store.ok_or("Store path required for status")?;
            commands::status::run(&path, &format)?;
        }
        Commands::Queue { format } => {
            let path = cli.store.ok_or("Store path required for queue")?;
            commands::queue::run(&path, &format)?;
        }
        Commands::Enqueue { kind, payload } => {
            let path = cli.store.ok_or("Store path required for enqueue")?;
            commands::enqueue::run(&path, &kind, &payload)?;
        }
        Commands::Login { user } => {
            let path = cli.store.ok_or("Store path required for login")?;
            commands::login::run(&path, &user)?;
        }
        Commands::Sync {
            base_url,
            timeout_ms,
            api_key,
        } => {
            let path = cli.store.ok_or("Store path required for sync")?;
            commands::sync::run(
                &path,
                &base_url,
                Duration::from_millis(timeout_ms),
                api_key.as_deref(),
            )?;
        }
        Commands::Version => {
            println!("closetsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
