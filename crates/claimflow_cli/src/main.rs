//! Claimflow CLI
//!
//! Runs the claims pipeline and inspects record stores.
//!
//! # Commands
//!
//! - `serve` - Run the consumer and the HTTP API over a store directory
//! - `inspect` - Display store metadata and backups
//! - `verify` - Verify snapshot integrity
//! - `backups` - List periodic backups

mod commands;

use clap::{Parser, Subcommand};
use claimflow_queue::{DEFAULT_PREFETCH, DEFAULT_QUEUE};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Claimflow claims pipeline and store tools.
#[derive(Parser)]
#[command(name = "claimflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the queue consumer and the HTTP API
    Serve {
        /// Address the HTTP API binds to
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        bind: SocketAddr,

        /// Queue carrying claim submissions
        #[arg(short, long, env = "CLAIMFLOW_QUEUE", default_value = DEFAULT_QUEUE)]
        queue: String,

        /// Unacknowledged deliveries allowed in flight
        #[arg(long, default_value_t = DEFAULT_PREFETCH)]
        prefetch: u16,

        /// Worker threads (0 sizes the pool to the prefetch)
        #[arg(short, long, default_value = "0")]
        workers: usize,

        /// Seconds shutdown waits for queued claims to be persisted
        #[arg(long, default_value = "30")]
        drain_timeout: u64,
    },

    /// Display store metadata and backups
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify snapshot integrity
    Verify {
        /// Also check every backup file
        #[arg(short, long)]
        backups: bool,
    },

    /// List periodic backups
    Backups,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            queue,
            prefetch,
            workers,
            drain_timeout,
        } => {
            let path = cli.path.ok_or("Store path required for serve")?;
            let options = commands::serve::ServeOptions {
                bind,
                queue,
                prefetch,
                workers,
                drain_timeout: Duration::from_secs(drain_timeout),
            };
            commands::serve::run(&path, options)?;
        }
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify { backups } => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path, backups)?;
        }
        Commands::Backups => {
            let path = cli.path.ok_or("Store path required for backups")?;
            commands::backups::run(&path)?;
        }
        Commands::Version => {
            println!("Claimflow CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Claimflow Core v{}", claimflow_core::VERSION);
        }
    }

    Ok(())
}
