//! # livefeed-updater
//!
//! Incremental search index updates driven by the replication feed.
//!
//! ## Key Components
//!
//! - [`DatabaseIndex`]: builds documents for root entity ids from the database
//! - [`ChangesAnalyzer`]: classifies change records against a dependency tree
//! - [`IdResolver`]: runs generated join queries to find affected root ids
//! - [`IndexingPool`]: bounded workers for document construction
//! - [`IndexUpdater`]: the per-index update run
//! - [`SqlIndex`]: a [`DatabaseIndex`] defined by a single SQL query
//!
//! ## Run
//!
//! 1. Read the position recorded in the index's meta document
//! 2. Pull packets `replication_sequence + 1, + 2, ...` until none is found,
//!    aborting on a schema change
//! 3. Fold in the database's unpublished changes
//! 4. Resolve changes on joined tables to root ids
//! 5. Delete and rebuild documents, then commit them with the new position
//!
//! Nothing is committed unless every step succeeds.

pub mod analyzer;
pub mod context;
pub mod error;
pub mod index;
pub mod pool;
pub mod resolver;
pub mod sql_index;
pub mod updater;

pub use analyzer::{ChangesAnalyzer, Classification};
pub use context::{ChangeSet, RunContext};
pub use error::UpdateError;
pub use index::DatabaseIndex;
pub use pool::IndexingPool;
pub use resolver::{resolve_pending, IdResolver};
pub use sql_index::SqlIndex;
pub use updater::{IndexUpdater, UpdateOutcome, UpdateSummary, UpdaterConfig};
