//! Replication-driven update run for one index.
//!
//! A run reads the index's recorded position, pulls every packet published
//! since, classifies their changes, resolves indirect changes to root ids,
//! rebuilds the affected documents and commits the new position together
//! with the documents. Any failure before the commit leaves the index at
//! its previous position, so a failed run can simply be repeated.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use livefeed_dependencies::IndexDependencies;
use livefeed_packet::ReplicationFeed;
use livefeed_search::{read_position, DocumentWriter, SearchIndex};
use livefeed_types::{IndexPosition, ReplicationPacket, Settings};

use crate::analyzer::ChangesAnalyzer;
use crate::context::{ChangeSet, RunContext};
use crate::error::UpdateError;
use crate::index::DatabaseIndex;
use crate::pool::IndexingPool;
use crate::resolver::{resolve_pending, IdResolver};

/// Configuration for an index updater.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Read unpublished changes from the database after the last packet
    pub use_database_tail: bool,
    /// Document construction workers
    pub workers: usize,
    /// Queued document construction jobs
    pub queue_size: usize,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            use_database_tail: true,
            workers: 4,
            queue_size: 10,
        }
    }
}

impl UpdaterConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            use_database_tail: settings.use_database_tail,
            workers: settings.indexing_workers,
            queue_size: settings.indexing_queue_size,
        }
    }

    pub fn with_database_tail(mut self, enabled: bool) -> Self {
        self.use_database_tail = enabled;
        self
    }

    pub fn with_workers(mut self, workers: usize, queue_size: usize) -> Self {
        self.workers = workers;
        self.queue_size = queue_size;
        self
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    pub index: String,
    pub packets_processed: usize,
    pub changes_analyzed: usize,
    pub changes_skipped: usize,
    /// Root ids found through join resolution
    pub ids_resolved: usize,
    pub ids_deleted: usize,
    pub ids_reindexed: usize,
    /// Position committed with the documents
    pub position: IndexPosition,
}

/// Result of a run that did not abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No new packet was published; nothing was written
    NoPackets,
    /// Packets were applied and committed
    Updated(UpdateSummary),
}

/// Keeps one search index in step with the replication feed.
pub struct IndexUpdater {
    index: Arc<dyn DatabaseIndex>,
    search_index: SearchIndex,
    analyzer: ChangesAnalyzer,
    feed: Arc<dyn ReplicationFeed>,
    resolver: Arc<dyn IdResolver>,
    config: UpdaterConfig,
}

impl IndexUpdater {
    pub fn new(
        index: Arc<dyn DatabaseIndex>,
        search_index: SearchIndex,
        dependencies: Arc<IndexDependencies>,
        feed: Arc<dyn ReplicationFeed>,
        resolver: Arc<dyn IdResolver>,
        config: UpdaterConfig,
    ) -> Self {
        Self {
            index,
            search_index,
            analyzer: ChangesAnalyzer::new(dependencies),
            feed,
            resolver,
            config,
        }
    }

    pub fn name(&self) -> &str {
        self.index.name()
    }

    pub fn search_index(&self) -> &SearchIndex {
        &self.search_index
    }

    /// Run one update.
    pub async fn run(&self) -> Result<UpdateOutcome, UpdateError> {
        let name = self.index.name().to_string();

        let start = read_position(&self.search_index)?;
        info!(
            index = %name,
            schema_sequence = start.schema_sequence,
            replication_sequence = start.replication_sequence,
            change_sequence = ?start.change_sequence,
            "Current index position"
        );

        let mut context = RunContext::new(start);
        self.pull_packets(&mut context).await?;
        self.pull_database_tail(&mut context).await?;

        if !context.packet_processed {
            info!(index = %name, "No new packets, index left untouched");
            return Ok(UpdateOutcome::NoPackets);
        }

        let ids_resolved = resolve_pending(
            self.analyzer.dependencies(),
            &mut context.changes,
            self.resolver.as_ref(),
        )
        .await?;

        let writer = DocumentWriter::new(&self.search_index, self.index.identifier_field())?;
        let position = IndexPosition {
            last_updated: Utc::now(),
            ..context.position.clone()
        };

        if let Err(e) = self.apply(&writer, &context.changes, &position).await {
            error!(index = %name, error = %e, "Update failed, rolling back");
            if let Err(rollback) = writer.rollback() {
                warn!(index = %name, error = %rollback, "Rollback failed");
            }
            return Err(e);
        }

        self.log_document_counts(&name).await;

        let summary = UpdateSummary {
            index: name,
            packets_processed: context.packets_processed,
            changes_analyzed: context.changes_analyzed,
            changes_skipped: context.changes_skipped,
            ids_resolved,
            ids_deleted: context.changes.deleted.len(),
            ids_reindexed: context.changes.inserted_or_updated.len(),
            position,
        };
        info!(
            index = %summary.index,
            packets = summary.packets_processed,
            deleted = summary.ids_deleted,
            reindexed = summary.ids_reindexed,
            replication_sequence = summary.position.replication_sequence,
            "Index updated"
        );
        Ok(UpdateOutcome::Updated(summary))
    }

    /// Fold every published packet after the current position.
    async fn pull_packets(&self, context: &mut RunContext) -> Result<(), UpdateError> {
        loop {
            let sequence = context.next_sequence();
            let Some(packet) = self.feed.packet(sequence).await? else {
                debug!(index = self.index.name(), sequence, "Caught up with published packets");
                return Ok(());
            };

            self.check_schema(context, &packet)?;
            info!(
                index = self.index.name(),
                sequence,
                changes = packet.changes.len(),
                "Processing packet"
            );
            self.analyzer.analyze_packet(&packet, context)?;
        }
    }

    /// Fold the database's unpublished changes, once the change sequence
    /// is known.
    async fn pull_database_tail(&self, context: &mut RunContext) -> Result<(), UpdateError> {
        if !self.config.use_database_tail {
            return Ok(());
        }
        let Some(since) = context.change_sequence() else {
            return Ok(());
        };
        let Some(mut packet) = self.feed.pending_changes(since).await? else {
            return Ok(());
        };

        self.check_schema(context, &packet)?;
        packet.replication_sequence = packet
            .replication_sequence
            .max(context.position.replication_sequence);

        info!(
            index = self.index.name(),
            since,
            changes = packet.changes.len(),
            "Processing pending database changes"
        );
        self.analyzer.analyze_packet(&packet, context)
    }

    fn check_schema(
        &self,
        context: &RunContext,
        packet: &ReplicationPacket,
    ) -> Result<(), UpdateError> {
        if packet.schema_sequence == context.start.schema_sequence {
            return Ok(());
        }
        error!(
            index = self.index.name(),
            expected = context.start.schema_sequence,
            found = packet.schema_sequence,
            packet = packet.replication_sequence,
            "Packet is for a different schema, aborting"
        );
        Err(UpdateError::SchemaMismatch {
            index: self.index.name().to_string(),
            expected: context.start.schema_sequence,
            found: packet.schema_sequence,
            packet: packet.replication_sequence,
        })
    }

    /// Delete, rebuild and commit with the new position.
    async fn apply(
        &self,
        writer: &DocumentWriter,
        changes: &ChangeSet,
        position: &IndexPosition,
    ) -> Result<(), UpdateError> {
        for id in &changes.deleted {
            debug!(index = self.index.name(), id, "Deleting document");
            writer.delete_identifier(&id.to_string())?;
        }

        if !changes.inserted_or_updated.is_empty() {
            self.index.init(writer, true).await?;
            self.reindex(writer, changes).await?;
        }

        self.index.update_meta_information(writer, position)?;
        writer.commit()?;
        Ok(())
    }

    /// Replace each document on the pool. Every return path drains it.
    async fn reindex(&self, writer: &DocumentWriter, changes: &ChangeSet) -> Result<(), UpdateError> {
        let pool = IndexingPool::new(self.config.workers, self.config.queue_size);

        for &id in &changes.inserted_or_updated {
            debug!(index = self.index.name(), id, "Reindexing document");

            let index = self.index.clone();
            let job_writer = writer.clone();
            let submitted = pool
                .submit(async move {
                    job_writer.delete_identifier(&id.to_string())?;
                    index.index_data(&job_writer, id, id).await
                })
                .await;
            if let Err(e) = submitted {
                return Err(pool.drain().await.err().unwrap_or(e));
            }
        }

        let completed = pool.drain().await?;
        debug!(index = self.index.name(), completed, "Reindexing finished");
        Ok(())
    }

    async fn log_document_counts(&self, name: &str) {
        let rows = self.index.no_of_rows(i64::MAX).await;
        let documents = self.search_index.count_documents();
        match (rows, documents) {
            (Ok(rows), Ok(documents)) => {
                info!(index = name, rows, documents, "Rows in database vs documents in index");
            }
            (Err(e), _) => warn!(index = name, error = %e, "Could not count database rows"),
            (_, Err(e)) => warn!(index = name, error = %e, "Could not count index documents"),
        }
    }
}
