//! Replication progress recorded with each index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::packet::ReplicationPacket;

/// Where an index stands in the replication stream.
///
/// Persisted as the index's single meta document and read back at the
/// start of every update run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPosition {
    pub schema_sequence: i64,
    pub replication_sequence: i64,
    /// Highest change id folded into the index, unknown for indexes built
    /// from a full dump
    pub change_sequence: Option<i64>,
    pub last_updated: DateTime<Utc>,
}

impl IndexPosition {
    pub fn new(schema_sequence: i64, replication_sequence: i64, change_sequence: Option<i64>) -> Self {
        Self {
            schema_sequence,
            replication_sequence,
            change_sequence,
            last_updated: Utc::now(),
        }
    }

    /// Position after applying `packet`.
    ///
    /// The change sequence never moves backwards: an empty packet keeps the
    /// previously known value.
    pub fn advanced_to(&self, packet: &ReplicationPacket) -> Self {
        let change_sequence = match (self.change_sequence, packet.max_change_id()) {
            (Some(known), Some(max)) => Some(known.max(max)),
            (known, max) => known.or(max),
        };
        Self {
            schema_sequence: packet.schema_sequence,
            replication_sequence: packet.replication_sequence,
            change_sequence,
            last_updated: Utc::now(),
        }
    }
}
