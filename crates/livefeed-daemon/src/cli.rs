//! CLI argument parsing for the live data feed updater.
//!
//! CLI flags override all other config sources.

use clap::{Parser, Subcommand};

/// Live data feed search index updater
///
/// Keeps search indexes in step with a replicated database.
#[derive(Parser, Debug)]
#[command(name = "livefeed-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/livefeed/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Updater commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply every replication packet published since the last run
    Update(UpdateArgs),

    /// Show the replication position of each index
    Status {
        /// Comma-separated index names (default: all configured)
        #[arg(long, value_delimiter = ',')]
        indexes: Vec<String>,
    },

    /// Validate and print the dependency configuration
    Dependencies {
        /// Only print this index
        #[arg(long)]
        index: Option<String>,
    },
}

/// Arguments for the update command
#[derive(clap::Args, Debug, Clone, Default)]
pub struct UpdateArgs {
    /// Comma-separated index names (default: all configured)
    #[arg(long, value_delimiter = ',')]
    pub indexes: Vec<String>,

    /// Override the replication packet repository
    #[arg(long)]
    pub replication_repository: Option<String>,

    /// Override the database connection URL
    #[arg(long)]
    pub database_url: Option<String>,

    /// Do not read unpublished changes from the database
    #[arg(long)]
    pub no_database_tail: bool,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}
