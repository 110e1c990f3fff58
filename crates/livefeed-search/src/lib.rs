//! # livefeed-search
//!
//! Tantivy index management for indexes kept current from the live data
//! feed.
//!
//! Every index carries a single meta document recording how far into the
//! replication stream it has been updated. [`DocumentWriter`] serializes all
//! physical writes so documents can be built in parallel, and the meta
//! document is replaced in the same commit as the documents it describes.
//!
//! ## Features
//! - Embedded Tantivy index with MmapDirectory for persistence
//! - Meta document fields added to any index schema
//! - Delete-by-identifier and replace semantics for incremental updates

pub mod error;
pub mod index;
pub mod meta;
pub mod schema;
pub mod writer;

pub use error::SearchError;
pub use index::{SearchIndex, SearchIndexConfig};
pub use meta::read_position;
pub use schema::{add_meta_fields, build_schema, MetaFields};
pub use writer::DocumentWriter;
