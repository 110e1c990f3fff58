//! Error types for the live data feed domain.

use thiserror::Error;

/// Errors raised while decoding feed data or loading settings.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed packed row data or packet metadata
    #[error("Parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// A change record that cannot be classified
    #[error("Invalid change: {0}")]
    InvalidChange(String),
}

impl FeedError {
    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Self {
        FeedError::Parse {
            offset,
            message: message.into(),
        }
    }
}
