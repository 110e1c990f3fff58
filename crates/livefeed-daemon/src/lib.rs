//! Live data feed updater library exports.
//!
//! This crate provides the operator CLI for the live data feed updater.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (update, status, dependencies)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, UpdateArgs};
pub use commands::{
    describe_dependencies, run_update, select_indexes, show_dependencies, show_status,
};
