//! Dependency configuration error types.

use thiserror::Error;

/// Errors that can occur while loading dependency configuration.
#[derive(Debug, Error)]
pub enum DependencyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Structurally invalid configuration
    #[error("Invalid dependency configuration for index {index}: {message}")]
    InvalidConfig { index: String, message: String },

    /// Index not declared
    #[error("Unknown index: {0}")]
    UnknownIndex(String),
}

impl DependencyError {
    pub(crate) fn invalid(index: &str, message: impl Into<String>) -> Self {
        DependencyError::InvalidConfig {
            index: index.to_string(),
            message: message.into(),
        }
    }
}
