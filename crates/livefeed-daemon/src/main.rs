//! Live data feed search index updater
//!
//! Applies replication packets published by a MusicBrainz-style database
//! to the search indexes built from it.
//!
//! # Usage
//!
//! ```bash
//! livefeed-daemon update [--indexes artist,work] [--no-database-tail]
//! livefeed-daemon status [--indexes artist]
//! livefeed-daemon dependencies [--index work]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/livefeed/config.toml)
//! 3. Environment variables (LIVEFEED_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use livefeed_daemon::{run_update, show_dependencies, show_status, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Update(args) => {
            run_update(cli.config.as_deref(), cli.log_level.as_deref(), args).await?;
        }
        Commands::Status { indexes } => {
            show_status(cli.config.as_deref(), cli.log_level.as_deref(), &indexes)?;
        }
        Commands::Dependencies { index } => {
            show_dependencies(cli.config.as_deref(), index.as_deref())?;
        }
    }

    Ok(())
}
