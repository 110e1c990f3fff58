//! The replication feed seen by index updaters.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::Client;

use livefeed_types::ReplicationPacket;

use crate::cache::PacketCache;
use crate::database::load_from_database;
use crate::error::PacketError;
use crate::repository::PacketRepository;

/// Source of replication packets.
#[async_trait]
pub trait ReplicationFeed: Send + Sync {
    /// Published packet `sequence`, or None once the feed is caught up.
    async fn packet(&self, sequence: i64) -> Result<Option<Arc<ReplicationPacket>>, PacketError>;

    /// Unpublished changes with an id greater than `since`, or None.
    async fn pending_changes(&self, since: i64)
        -> Result<Option<ReplicationPacket>, PacketError>;
}

/// Feed backed by a packet repository, a shared cache and optionally the
/// source database.
pub struct LiveFeed {
    repository: Arc<PacketRepository>,
    cache: Arc<PacketCache>,
    database: Option<Arc<Client>>,
}

impl LiveFeed {
    pub fn new(repository: Arc<PacketRepository>, cache: Arc<PacketCache>) -> Self {
        Self {
            repository,
            cache,
            database: None,
        }
    }

    /// Read the unpublished tail of changes from `client`.
    pub fn with_database(mut self, client: Arc<Client>) -> Self {
        self.database = Some(client);
        self
    }

    pub fn cache(&self) -> &Arc<PacketCache> {
        &self.cache
    }
}

#[async_trait]
impl ReplicationFeed for LiveFeed {
    async fn packet(&self, sequence: i64) -> Result<Option<Arc<ReplicationPacket>>, PacketError> {
        let repository = &self.repository;
        self.cache
            .get_or_load(sequence, || repository.load(sequence))
            .await
    }

    async fn pending_changes(
        &self,
        since: i64,
    ) -> Result<Option<ReplicationPacket>, PacketError> {
        match &self.database {
            Some(client) => load_from_database(client, since).await,
            None => Ok(None),
        }
    }
}
