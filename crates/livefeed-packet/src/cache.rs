//! Process-wide packet cache.
//!
//! Several index updaters walk the same packet sequence in one run; each
//! packet is fetched and decoded once and then shared.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use tracing::debug;

use livefeed_types::ReplicationPacket;

use crate::error::PacketError;

/// Packets keyed by replication sequence.
#[derive(Debug, Default)]
pub struct PacketCache {
    packets: RwLock<HashMap<i64, Arc<ReplicationPacket>>>,
}

impl PacketCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sequence: i64) -> Option<Arc<ReplicationPacket>> {
        let packets = self.packets.read().unwrap_or_else(|e| e.into_inner());
        packets.get(&sequence).cloned()
    }

    /// Store `packet` under its replication sequence.
    ///
    /// An already cached packet wins over the new one.
    pub fn insert(&self, packet: ReplicationPacket) -> Arc<ReplicationPacket> {
        let mut packets = self.packets.write().unwrap_or_else(|e| e.into_inner());
        packets
            .entry(packet.replication_sequence)
            .or_insert_with(|| Arc::new(packet))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.packets.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached packet or run `load` and cache its result.
    ///
    /// A missing packet is not remembered; it may be published later.
    /// Concurrent misses may load the same packet twice, the first
    /// insert wins.
    pub async fn get_or_load<F, Fut>(
        &self,
        sequence: i64,
        load: F,
    ) -> Result<Option<Arc<ReplicationPacket>>, PacketError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<ReplicationPacket>, PacketError>>,
    {
        if let Some(packet) = self.get(sequence) {
            debug!(sequence, "Packet cache hit");
            return Ok(Some(packet));
        }

        match load().await? {
            Some(mut packet) => {
                // keyed by the requested sequence
                packet.replication_sequence = sequence;
                Ok(Some(self.insert(packet)))
            }
            None => Ok(None),
        }
    }
}
