//! # livefeed-types
//!
//! Shared domain types for the live data feed search index updater.
//!
//! This crate defines the data that flows between the packet loader and
//! the update orchestrator:
//! - Change records: one row-level INSERT/UPDATE/DELETE with old/new values
//! - Replication packets: numbered, ordered batches of change records
//! - Index positions: the replication progress persisted with each index
//! - Settings: layered configuration
//!
//! The packed row format written by the replication triggers is decoded
//! by [`unpack`].

pub mod change;
pub mod config;
pub mod error;
pub mod packet;
pub mod position;
pub mod unpack;

pub use change::{ChangeRecord, Operation};
pub use config::{Settings, SqlIndexSettings};
pub use error::FeedError;
pub use packet::ReplicationPacket;
pub use position::IndexPosition;
pub use unpack::{changed_fields, pack, unescape_copy_text, unpack, FieldMap};
