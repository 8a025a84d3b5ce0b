//! jotdb CLI
//!
//! Command-line tools for jotdb store directories.
//!
//! # Commands
//!
//! - `get` / `set` / `del` / `has` - Key-value operations
//! - `inspect` - Display store statistics and block metadata
//! - `compact` - Compact eligible blocks to reclaim space

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// jotdb command-line store tools.
#[derive(Parser)]
#[command(name = "jotdb")]
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
    /// Read the record stored under a key
    Get {
        /// Record id
        key: String,
    },

    /// Write a record under a key
    Set {
        /// Record id
        key: String,
        /// Record value as a JSON object
        value: String,
    },

    /// Delete the record stored under a key
    Del {
        /// Record id
        key: String,
    },

    /// Check whether a key is present
    Has {
        /// Record id
        key: String,
    },

    /// Display store statistics and block metadata
    Inspect {
        /// Show per-block details
        #[arg(short, long)]
        blocks: bool,
    },

    /// Compact eligible blocks to reclaim space
    Compact,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Get { key } => {
            let path = cli.path.ok_or("Store path required for get")?;
            commands::kv::get(&path, &key)?;
        }
        Commands::Set { key, value } => {
            let path = cli.path.ok_or("Store path required for set")?;
            commands::kv::set(&path, &key, &value)?;
        }
        Commands::Del { key } => {
            let path = cli.path.ok_or("Store path required for del")?;
            commands::kv::del(&path, &key)?;
        }
        Commands::Has { key } => {
            let path = cli.path.ok_or("Store path required for has")?;
            commands::kv::has(&path, &key)?;
        }
        Commands::Inspect { blocks } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, blocks)?;
        }
        Commands::Compact => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path)?;
        }
        Commands::Version => {
            println!("jotdb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("jotdb Core v{}", jotdb_core::VERSION);
        }
    }

    Ok(())
}
