//! Shared fixtures for updater integration tests.
//!
//! The feed, resolver and index are in-memory fakes; documents go to a real
//! tantivy index in a temp dir.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tantivy::collector::TopDocs;
use tantivy::query::AllQuery;
use tantivy::schema::{Schema, Value};
use tantivy::{doc, TantivyDocument};
use tempfile::TempDir;

use livefeed_dependencies::{DependencyConfig, IndexDependencies};
use livefeed_packet::{PacketError, ReplicationFeed};
use livefeed_search::{build_schema, read_position, DocumentWriter, SearchIndex, SearchIndexConfig};
use livefeed_types::{unpack, ChangeRecord, IndexPosition, Operation, ReplicationPacket};
use livefeed_updater::{
    DatabaseIndex, IdResolver, IndexUpdater, UpdateError, UpdateOutcome, UpdaterConfig,
};

pub const SCHEMA_SEQUENCE: i64 = 12;

/// Packets by sequence plus an optional unpublished tail.
#[derive(Default)]
pub struct FakeFeed {
    packets: Mutex<BTreeMap<i64, Arc<ReplicationPacket>>>,
    tail: Mutex<Option<ReplicationPacket>>,
    pub requested: Mutex<Vec<i64>>,
}

impl FakeFeed {
    pub fn publish(&self, packet: ReplicationPacket) {
        self.packets
            .lock()
            .unwrap()
            .insert(packet.replication_sequence, Arc::new(packet));
    }

    pub fn set_tail(&self, packet: ReplicationPacket) {
        *self.tail.lock().unwrap() = Some(packet);
    }
}

#[async_trait]
impl ReplicationFeed for FakeFeed {
    async fn packet(&self, sequence: i64) -> Result<Option<Arc<ReplicationPacket>>, PacketError> {
        self.requested.lock().unwrap().push(sequence);
        Ok(self.packets.lock().unwrap().get(&sequence).cloned())
    }

    async fn pending_changes(
        &self,
        since: i64,
    ) -> Result<Option<ReplicationPacket>, PacketError> {
        let tail = self.tail.lock().unwrap().clone();
        Ok(tail.and_then(|mut packet| {
            packet.changes.retain(|c| c.id > since);
            (!packet.changes.is_empty()).then_some(packet)
        }))
    }
}

/// Answers generated queries from a fixed table.
#[derive(Default)]
pub struct FakeResolver {
    answers: Mutex<HashMap<String, Vec<i64>>>,
    pub queries: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn answer(&self, sql: impl Into<String>, ids: Vec<i64>) {
        self.answers.lock().unwrap().insert(sql.into(), ids);
    }
}

#[async_trait]
impl IdResolver for FakeResolver {
    async fn resolve(&self, sql: &str) -> Result<Vec<i64>, UpdateError> {
        self.queries.lock().unwrap().push(sql.to_string());
        Ok(self
            .answers
            .lock()
            .unwrap()
            .get(sql)
            .cloned()
            .unwrap_or_default())
    }
}

/// Artist index over an in-memory table of id to name.
#[derive(Default)]
pub struct FakeArtistIndex {
    rows: Mutex<BTreeMap<i64, String>>,
    failing_ids: Mutex<BTreeSet<i64>>,
    delay: Mutex<Option<Duration>>,
    pub init_calls: AtomicUsize,
    pub jobs_started: AtomicUsize,
    pub jobs_in_flight: AtomicUsize,
}

impl FakeArtistIndex {
    pub fn set_row(&self, id: i64, name: &str) {
        self.rows.lock().unwrap().insert(id, name.to_string());
    }

    pub fn remove_row(&self, id: i64) {
        self.rows.lock().unwrap().remove(&id);
    }

    pub fn fail_on(&self, id: i64) {
        self.failing_ids.lock().unwrap().insert(id);
    }

    /// Make every successful `index_data` call take at least `delay`.
    pub fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    fn build_documents(
        &self,
        writer: &DocumentWriter,
        min_id: i64,
        max_id: i64,
    ) -> Result<(), UpdateError> {
        let rows: Vec<(i64, String)> = self
            .rows
            .lock()
            .unwrap()
            .range(min_id..=max_id)
            .map(|(id, name)| (*id, name.clone()))
            .collect();
        let name_field = writer.field("name")?;
        for (id, name) in rows {
            writer.add_document(doc!(
                writer.identifier_field() => id.to_string(),
                name_field => name
            ))?;
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseIndex for FakeArtistIndex {
    fn name(&self) -> &str {
        "artist"
    }

    fn identifier_field(&self) -> &str {
        "_id"
    }

    fn schema(&self) -> Schema {
        build_schema("_id", &["name".to_string()])
    }

    async fn init(&self, _writer: &DocumentWriter, _incremental: bool) -> Result<(), UpdateError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn index_data(
        &self,
        writer: &DocumentWriter,
        min_id: i64,
        max_id: i64,
    ) -> Result<(), UpdateError> {
        self.jobs_started.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_ids
            .lock()
            .unwrap()
            .range(min_id..=max_id)
            .next()
            .copied();
        if let Some(id) = failing {
            return Err(UpdateError::Index(format!("cannot build artist {id}")));
        }

        self.jobs_in_flight.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.build_documents(writer, min_id, max_id);
        self.jobs_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn no_of_rows(&self, max_id: i64) -> Result<u64, UpdateError> {
        Ok(self.rows.lock().unwrap().range(..=max_id).count() as u64)
    }
}

/// An artist index on disk with its fakes.
pub struct TestHarness {
    pub _temp_dir: TempDir,
    pub feed: Arc<FakeFeed>,
    pub resolver: Arc<FakeResolver>,
    pub index: Arc<FakeArtistIndex>,
    pub dependencies: Arc<IndexDependencies>,
    pub config: UpdaterConfig,
}

impl TestHarness {
    /// Create an index at `position` holding documents for `rows`.
    pub fn new(position: IndexPosition, rows: &[(i64, &str)]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let index = Arc::new(FakeArtistIndex::default());
        for (id, name) in rows {
            index.set_row(*id, name);
        }

        let search_index = SearchIndex::create(
            SearchIndexConfig::new(temp_dir.path().join("artist")),
            index.schema(),
        )
        .expect("Failed to create index");
        {
            let writer = DocumentWriter::new(&search_index, "_id").expect("Failed to open writer");
            let name = writer.field("name").expect("Missing name field");
            for (id, row) in rows {
                writer
                    .add_document(doc!(writer.identifier_field() => id.to_string(), name => *row))
                    .expect("Failed to add document");
            }
            writer.write_position(&position).expect("Failed to write position");
            writer.commit().expect("Failed to commit");
        }

        let dependencies = DependencyConfig::bundled()
            .and_then(|c| c.build())
            .and_then(|r| r.index("artist"))
            .expect("Bundled artist dependencies");

        Self {
            _temp_dir: temp_dir,
            feed: Arc::new(FakeFeed::default()),
            resolver: Arc::new(FakeResolver::default()),
            index,
            dependencies,
            config: UpdaterConfig::default().with_workers(2, 2),
        }
    }

    pub fn index_path(&self) -> std::path::PathBuf {
        self._temp_dir.path().join("artist")
    }

    pub fn open_index(&self) -> SearchIndex {
        SearchIndex::open(SearchIndexConfig::new(self.index_path())).expect("Failed to open index")
    }

    pub fn updater(&self) -> IndexUpdater {
        IndexUpdater::new(
            self.index.clone(),
            self.open_index(),
            self.dependencies.clone(),
            self.feed.clone(),
            self.resolver.clone(),
            self.config.clone(),
        )
    }

    pub async fn run(&self) -> Result<UpdateOutcome, UpdateError> {
        self.updater().run().await
    }

    pub fn position(&self) -> IndexPosition {
        read_position(&self.open_index()).expect("Failed to read position")
    }

    /// Committed documents as id to name.
    pub fn documents(&self) -> BTreeMap<String, String> {
        let index = self.open_index();
        let schema = index.schema();
        let id_field = schema.get_field("_id").expect("Missing _id field");
        let name_field = schema.get_field("name").expect("Missing name field");

        let reader = index.reader().expect("Failed to open reader");
        let searcher = reader.searcher();
        let hits = searcher
            .search(&AllQuery, &TopDocs::with_limit(1000))
            .expect("Search failed");

        hits.into_iter()
            .filter_map(|(_, address)| {
                let doc: TantivyDocument = searcher.doc(address).ok()?;
                let id = doc.get_first(id_field)?.as_str()?.to_string();
                let name = doc.get_first(name_field)?.as_str()?.to_string();
                Some((id, name))
            })
            .collect()
    }
}

pub fn start_position() -> IndexPosition {
    IndexPosition::new(SCHEMA_SEQUENCE, 100, Some(1_000))
}

pub fn change(id: i64, table: &str, operation: Operation, old: &str, new: &str) -> ChangeRecord {
    ChangeRecord::new(id, table, operation)
        .with_old_values(unpack(old).expect("Invalid old values"))
        .with_new_values(unpack(new).expect("Invalid new values"))
}

pub fn artist_insert(change_id: i64, artist: i64, name: &str) -> ChangeRecord {
    change(
        change_id,
        "artist",
        Operation::Insert,
        "",
        &format!("\"id\"='{artist}' \"name\"='{name}' "),
    )
}

pub fn artist_update(change_id: i64, artist: i64, old: &str, new: &str) -> ChangeRecord {
    change(
        change_id,
        "artist",
        Operation::Update,
        &format!("\"id\"='{artist}' \"name\"='{old}' "),
        &format!("\"id\"='{artist}' \"name\"='{new}' "),
    )
}

pub fn artist_delete(change_id: i64, artist: i64) -> ChangeRecord {
    change(
        change_id,
        "artist",
        Operation::Delete,
        &format!("\"id\"='{artist}' \"name\"='gone' "),
        "",
    )
}

pub fn packet(sequence: i64, changes: Vec<ChangeRecord>) -> ReplicationPacket {
    ReplicationPacket::new(SCHEMA_SEQUENCE, sequence).with_changes(changes)
}
