//! Tantivy index management.
//!
//! Handles index creation, opening, and document counts.

use std::path::{Path, PathBuf};

use tantivy::collector::Count;
use tantivy::query::TermQuery;
use tantivy::schema::{IndexRecordOption, Schema};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Term};
use tracing::{debug, info};

use crate::error::SearchError;
use crate::schema::{MetaFields, META_VALUE};

/// Default memory budget for IndexWriter (50MB)
const DEFAULT_WRITER_MEMORY_MB: usize = 50;

/// Search index configuration
#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    /// Path to index directory
    pub index_path: PathBuf,
    /// Memory budget for writer in MB
    pub writer_memory_mb: usize,
}

impl SearchIndexConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
        }
    }

    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = mb;
        self
    }
}

/// Wrapper for a Tantivy index carrying a meta document.
pub struct SearchIndex {
    index: Index,
    meta: MetaFields,
    config: SearchIndexConfig,
}

impl SearchIndex {
    /// Open an existing index.
    pub fn open(config: SearchIndexConfig) -> Result<Self, SearchError> {
        if !config.index_path.join("meta.json").exists() {
            return Err(SearchError::IndexNotFound(
                config.index_path.display().to_string(),
            ));
        }
        let index = Index::open_in_dir(&config.index_path)?;
        let meta = MetaFields::from_schema(&index.schema())?;

        info!(path = ?config.index_path, "Opened search index");

        Ok(Self {
            index,
            meta,
            config,
        })
    }

    /// Create a new index with `schema`.
    ///
    /// The schema must include the meta document fields.
    pub fn create(config: SearchIndexConfig, schema: Schema) -> Result<Self, SearchError> {
        let meta = MetaFields::from_schema(&schema)?;
        info!(path = ?config.index_path, "Creating new index");
        std::fs::create_dir_all(&config.index_path)?;
        let index = Index::create_in_dir(&config.index_path, schema)?;

        Ok(Self {
            index,
            meta,
            config,
        })
    }

    /// Open existing index or create new one with `schema`.
    pub fn open_or_create(config: SearchIndexConfig, schema: Schema) -> Result<Self, SearchError> {
        if config.index_path.join("meta.json").exists() {
            Self::open(config)
        } else {
            Self::create(config, schema)
        }
    }

    /// Get the underlying Tantivy index
    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn schema(&self) -> Schema {
        self.index.schema()
    }

    pub fn meta_fields(&self) -> MetaFields {
        self.meta
    }

    /// Create an IndexWriter with configured memory budget
    pub fn writer(&self) -> Result<IndexWriter, SearchError> {
        let memory_budget = self.config.writer_memory_mb * 1024 * 1024;
        let writer = self.index.writer(memory_budget).map_err(|e| match e {
            tantivy::TantivyError::LockFailure(..) => {
                SearchError::IndexLocked(self.config.index_path.display().to_string())
            }
            other => SearchError::Tantivy(other),
        })?;
        debug!(
            memory_mb = self.config.writer_memory_mb,
            "Created index writer"
        );
        Ok(writer)
    }

    /// Create an IndexReader with OnCommit reload policy
    pub fn reader(&self) -> Result<IndexReader, SearchError> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;
        debug!("Created index reader");
        Ok(reader)
    }

    /// Get the index path
    pub fn path(&self) -> &Path {
        &self.config.index_path
    }

    /// Number of committed documents, not counting the meta document.
    pub fn count_documents(&self) -> Result<u64, SearchError> {
        let reader = self.reader()?;
        let searcher = reader.searcher();
        let total: u64 = searcher
            .segment_readers()
            .iter()
            .map(|r| r.num_docs() as u64)
            .sum();

        let query = TermQuery::new(
            Term::from_field_text(self.meta.meta, META_VALUE),
            IndexRecordOption::Basic,
        );
        let meta_docs = searcher.search(&query, &Count)? as u64;

        Ok(total.saturating_sub(meta_docs))
    }
}
