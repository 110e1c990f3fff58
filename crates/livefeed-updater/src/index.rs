//! The database-backed index capability driven by the updater.
//!
//! Implementations know how to turn source rows into search documents;
//! the updater only decides which ids need deleting or rebuilding.

use async_trait::async_trait;
use tantivy::schema::Schema;

use livefeed_search::DocumentWriter;
use livefeed_types::IndexPosition;

use crate::error::UpdateError;

/// A search index built from database rows.
#[async_trait]
pub trait DatabaseIndex: Send + Sync {
    /// Index name, matching its dependency configuration.
    fn name(&self) -> &str;

    /// Field documents are matched and deleted by.
    fn identifier_field(&self) -> &str;

    /// Schema used when the index is created, including the meta fields.
    fn schema(&self) -> Schema;

    /// Prepare for indexing. Called once per run before any `index_data`.
    async fn init(&self, writer: &DocumentWriter, incremental: bool) -> Result<(), UpdateError>;

    /// Build and add documents for root ids in `min_id..=max_id`.
    async fn index_data(
        &self,
        writer: &DocumentWriter,
        min_id: i64,
        max_id: i64,
    ) -> Result<(), UpdateError>;

    /// Number of source rows with an id up to `max_id`.
    async fn no_of_rows(&self, max_id: i64) -> Result<u64, UpdateError>;

    /// Record the replication position reached by this run.
    fn update_meta_information(
        &self,
        writer: &DocumentWriter,
        position: &IndexPosition,
    ) -> Result<(), UpdateError> {
        writer.write_position(position)?;
        Ok(())
    }
}
