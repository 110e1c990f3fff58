//! # livefeed-packet
//!
//! Loading of replication packets for the live data feed updater.
//!
//! Packets come from two places:
//! - the packet repository: `replication-<seq>.tar.bz2` archives published
//!   over HTTP or mirrored to a local directory
//! - the source database's own pending-change log, for the tail of changes
//!   not yet published
//!
//! A missing archive is the normal "caught up" signal and is reported as
//! `Ok(None)`, never as an error. Fetched packets are memoized per process
//! in a [`PacketCache`] shared by every index updater.

pub mod archive;
pub mod cache;
pub mod database;
pub mod error;
pub mod feed;
pub mod repository;

#[cfg(test)]
pub(crate) mod testing;

pub use archive::{decode_packet, read_archive};
pub use cache::PacketCache;
pub use database::{load_from_database, packet_from_pending_rows, PendingRow};
pub use error::PacketError;
pub use feed::{LiveFeed, ReplicationFeed};
pub use repository::{PacketRepository, RepositoryConfig};
