//! Per-run state threaded through the update steps.

use std::collections::{BTreeMap, BTreeSet};

use livefeed_types::{IndexPosition, ReplicationPacket};

/// Root ids to delete or rebuild, plus leaf keys still to resolve.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub inserted_or_updated: BTreeSet<i64>,
    pub deleted: BTreeSet<i64>,
    /// Join-column values per non-root table
    pub pending: BTreeMap<String, BTreeSet<i64>>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a root id as inserted or updated. A later change wins over an
    /// earlier delete.
    pub fn mark_upserted(&mut self, id: i64) {
        self.deleted.remove(&id);
        self.inserted_or_updated.insert(id);
    }

    /// Mark a root id as deleted. A later delete wins over an earlier
    /// insert or update.
    pub fn mark_deleted(&mut self, id: i64) {
        self.inserted_or_updated.remove(&id);
        self.deleted.insert(id);
    }

    pub fn add_pending(&mut self, table: &str, key: i64) {
        self.pending.entry(table.to_string()).or_default().insert(key);
    }

    /// Fold resolved root ids in as updates.
    pub fn add_resolved<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = i64>,
    {
        for id in ids {
            self.mark_upserted(id);
        }
    }

    /// Remove and return the pending keys.
    pub fn take_pending(&mut self) -> BTreeMap<String, BTreeSet<i64>> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.inserted_or_updated.is_empty() && self.deleted.is_empty() && self.pending.is_empty()
    }
}

/// Progress of one update run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Position read from the index at the start of the run
    pub start: IndexPosition,
    /// Position reached by the packets folded in so far
    pub position: IndexPosition,
    /// Whether any packet was folded in
    pub packet_processed: bool,
    pub packets_processed: usize,
    pub changes_analyzed: usize,
    pub changes_skipped: usize,
    pub changes: ChangeSet,
}

impl RunContext {
    pub fn new(start: IndexPosition) -> Self {
        Self {
            position: start.clone(),
            start,
            packet_processed: false,
            packets_processed: 0,
            changes_analyzed: 0,
            changes_skipped: 0,
            changes: ChangeSet::new(),
        }
    }

    /// Next archived packet to request.
    pub fn next_sequence(&self) -> i64 {
        self.position.replication_sequence + 1
    }

    /// Highest change id already folded in, used as the skip threshold.
    pub fn change_sequence(&self) -> Option<i64> {
        self.position.change_sequence
    }

    /// Record that `packet` has been classified.
    pub fn advance(&mut self, packet: &ReplicationPacket) {
        self.position = self.position.advanced_to(packet);
        self.packet_processed = true;
        self.packets_processed += 1;
    }
}
