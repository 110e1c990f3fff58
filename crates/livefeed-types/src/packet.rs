//! Replication packets.

use crate::change::ChangeRecord;

/// An ordered batch of change records published by the source database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationPacket {
    /// Schema version the packet was produced against
    pub schema_sequence: i64,
    /// Position of this packet in the packet stream
    pub replication_sequence: i64,
    /// Changes in change-id order
    pub changes: Vec<ChangeRecord>,
}

impl ReplicationPacket {
    pub fn new(schema_sequence: i64, replication_sequence: i64) -> Self {
        Self {
            schema_sequence,
            replication_sequence,
            changes: Vec::new(),
        }
    }

    pub fn with_changes(mut self, changes: Vec<ChangeRecord>) -> Self {
        self.changes = changes;
        self
    }

    /// Highest change id in the packet, None when it is empty.
    pub fn max_change_id(&self) -> Option<i64> {
        self.changes.iter().map(|c| c.id).max()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Operation;

    #[test]
    fn test_max_change_id() {
        let packet = ReplicationPacket::new(12, 100).with_changes(vec![
            ChangeRecord::new(7, "artist", Operation::Insert),
            ChangeRecord::new(9, "artist", Operation::Update),
            ChangeRecord::new(8, "label", Operation::Delete),
        ]);
        assert_eq!(packet.max_change_id(), Some(9));
        assert!(!packet.is_empty());
    }

    #[test]
    fn test_empty_packet() {
        let packet = ReplicationPacket::new(12, 101);
        assert_eq!(packet.max_change_id(), None);
        assert!(packet.is_empty());
    }
}
