//! Shared index writer handle.
//!
//! Wraps IndexWriter with shared access via Arc<Mutex>. Documents may be
//! built on many tasks at once; every physical write goes through the lock.
//! Nothing is visible until commit() is called.

use std::sync::{Arc, Mutex};

use tantivy::schema::{Field, Schema};
use tantivy::{doc, IndexWriter, TantivyDocument, Term};
use tracing::{debug, info, warn};

use livefeed_types::IndexPosition;

use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::schema::{get_field, MetaFields, META_VALUE};

/// Cloneable handle to an index's single writer.
#[derive(Clone)]
pub struct DocumentWriter {
    writer: Arc<Mutex<IndexWriter>>,
    schema: Schema,
    meta: MetaFields,
    identifier: Field,
}

impl DocumentWriter {
    /// Create a writer for `index`, matching documents by `identifier_field`.
    pub fn new(index: &SearchIndex, identifier_field: &str) -> Result<Self, SearchError> {
        let writer = index.writer()?;
        Self::from_writer(writer, index.schema(), identifier_field)
    }

    /// Create from an existing writer.
    pub fn from_writer(
        writer: IndexWriter,
        schema: Schema,
        identifier_field: &str,
    ) -> Result<Self, SearchError> {
        let meta = MetaFields::from_schema(&schema)?;
        let identifier = get_field(&schema, identifier_field)?;
        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            schema,
            meta,
            identifier,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Field documents are matched and deleted by.
    pub fn identifier_field(&self) -> Field {
        self.identifier
    }

    /// Resolve a field of this index's schema by name.
    pub fn field(&self, name: &str) -> Result<Field, SearchError> {
        get_field(&self.schema, name)
    }

    /// Queue a document for the next commit.
    pub fn add_document(&self, doc: TantivyDocument) -> Result<u64, SearchError> {
        let writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;
        let opstamp = writer.add_document(doc)?;
        Ok(opstamp)
    }

    /// Delete every document whose identifier equals `id`.
    pub fn delete_identifier(&self, id: &str) -> Result<(), SearchError> {
        let writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;
        writer.delete_term(Term::from_field_text(self.identifier, id));
        debug!(id, "Deleted document");
        Ok(())
    }

    /// Replace the meta document with `position`.
    ///
    /// The old meta document is deleted and the new one added in the same
    /// batch, so the switch happens atomically on commit.
    pub fn write_position(&self, position: &IndexPosition) -> Result<(), SearchError> {
        let meta = self.meta;
        let document = doc!(
            meta.meta => META_VALUE,
            meta.schema_sequence => position.schema_sequence.to_string(),
            meta.replication_sequence => position.replication_sequence.to_string(),
            meta.change_sequence => position
                .change_sequence
                .map(|c| c.to_string())
                .unwrap_or_default(),
            meta.last_updated => position.last_updated.to_rfc3339()
        );

        let writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;
        writer.delete_term(Term::from_field_text(meta.meta, META_VALUE));
        writer.add_document(document)?;

        debug!(
            schema_sequence = position.schema_sequence,
            replication_sequence = position.replication_sequence,
            change_sequence = ?position.change_sequence,
            "Wrote meta document"
        );
        Ok(())
    }

    /// Commit pending changes to make them searchable.
    pub fn commit(&self) -> Result<u64, SearchError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        let opstamp = writer.commit()?;
        info!(opstamp, "Committed index changes");
        Ok(opstamp)
    }

    /// Rollback uncommitted changes.
    pub fn rollback(&self) -> Result<u64, SearchError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        let opstamp = writer.rollback()?;
        warn!(opstamp, "Rolled back index changes");
        Ok(opstamp)
    }
}
