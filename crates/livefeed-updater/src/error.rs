//! Error types for index update runs.

use livefeed_dependencies::DependencyError;
use livefeed_packet::PacketError;
use livefeed_search::SearchError;
use thiserror::Error;

/// Errors that abort an update run.
///
/// Every variant leaves the index at its last committed position.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Search index operation failed
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Packet fetch or decode failed
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    /// Database query failed
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Dependency configuration problem
    #[error("Dependency error: {0}")]
    Dependency(#[from] DependencyError),

    /// Change record that cannot be classified
    #[error("Invalid change: {0}")]
    InvalidChange(String),

    /// Packet produced against a different database schema
    #[error(
        "Schema mismatch for index {index}: index is at schema {expected}, packet {packet} is at schema {found}"
    )]
    SchemaMismatch {
        index: String,
        expected: i64,
        found: i64,
        packet: i64,
    },

    /// Document construction failed
    #[error("Index error: {0}")]
    Index(String),

    /// Indexing worker failed
    #[error("Indexing pool error: {0}")]
    Pool(String),
}

impl UpdateError {
    /// Whether retrying the whole run later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpdateError::Packet(e) => e.is_transient(),
            UpdateError::Database(_) => true,
            _ => false,
        }
    }
}
