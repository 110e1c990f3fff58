//! Packet loading error types.

use thiserror::Error;

use livefeed_types::FeedError;

/// Errors that can occur while loading replication packets.
#[derive(Debug, Error)]
pub enum PacketError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Unexpected HTTP status
    #[error("Unexpected status {status} fetching {url}")]
    Status { url: String, status: u16 },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Structurally invalid packet archive
    #[error("Invalid packet archive: {0}")]
    Archive(String),

    /// Malformed change data
    #[error(transparent)]
    Parse(#[from] FeedError),

    /// Background decode task failed
    #[error("Decode task failed: {0}")]
    Join(String),

    /// Invalid repository configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PacketError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PacketError::Http(e) => !e.is_builder() && !e.is_decode(),
            PacketError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
