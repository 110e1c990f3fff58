//! Search error types.

use thiserror::Error;

/// Errors that can occur during index operations.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Tantivy index error
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Index not found
    #[error("Index not found at path: {0}")]
    IndexNotFound(String),

    /// Schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Index is locked (another process has it open)
    #[error("Index is locked: {0}")]
    IndexLocked(String),

    /// No meta document in the index
    #[error("No meta document found in index at {0}")]
    MetaDocumentMissing(String),

    /// More than one meta document in the index
    #[error("Found {count} meta documents in index at {path}, expected exactly one")]
    MetaDocumentAmbiguous { path: String, count: usize },

    /// Meta document with unreadable values
    #[error("Invalid meta document: {0}")]
    InvalidMeta(String),
}
