//! In-process [`RemoteStore`].
//!
//! Backs the admin tool's offline mode and every test in the workspace. Writes
//! can be held at a gate, delayed, or made to fail, so callers can observe the
//! optimistic window and the rollback path deterministically.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};
use tracing::trace;

use crate::collection::{sort_records, Collection};
use crate::record::{Record, RecordId, RecordPatch};
use crate::store::{ChangeEvent, ChangeFeed, ChangeKind, RemoteStore, StoreError};

const FEED_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<Collection, Vec<Record>>,
    clock: u64,
    next_id: u64,
    fail_writes: usize,
    fail_reads: usize,
    reads: usize,
    writes: usize,
}

/// Store that keeps every collection in memory.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    feeds: HashMap<Collection, broadcast::Sender<ChangeEvent>>,
    gate: watch::Sender<bool>,
    latency: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store, writes open, no latency.
    pub fn new() -> Self {
        let feeds = Collection::ALL
            .into_iter()
            .map(|c| (c, broadcast::channel(FEED_CAPACITY).0))
            .collect();
        let (gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(MemoryState::default()),
            feeds,
            gate,
            latency: Duration::ZERO,
        }
    }

    /// Delay every remote call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Replace a collection's contents without emitting change events.
    pub fn seed(&self, collection: Collection, records: Vec<Record>) {
        let mut state = self.lock();
        if let Some(newest) = records.iter().map(|r| r.created_at).max() {
            state.clock = state.clock.max(newest);
        }
        state.tables.insert(collection, records);
    }

    /// Make the next `n` writes (status or field patches) fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.lock().fail_writes = n;
    }

    /// Make the next `n` reads fail.
    pub fn fail_next_reads(&self, n: usize) {
        self.lock().fail_reads = n;
    }

    /// Park writes until [`release_writes`](Self::release_writes).
    pub fn hold_writes(&self) {
        self.gate.send_replace(false);
    }

    /// Let parked and future writes through.
    pub fn release_writes(&self) {
        self.gate.send_replace(true);
    }

    /// Current contents of a collection, in read order.
    pub fn snapshot(&self, collection: Collection) -> Vec<Record> {
        let state = self.lock();
        let mut records = state.tables.get(&collection).cloned().unwrap_or_default();
        sort_records(&mut records, collection.order());
        records
    }

    /// Reads served so far, including failed ones.
    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    /// Writes landed so far, including failed ones.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Change a record as if another client had, and announce it.
    pub fn apply_external(
        &self,
        collection: Collection,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> Result<(), StoreError> {
        self.lock().patch(collection, id, patch)?;
        self.publish(collection, ChangeKind::Update, Some(id.clone()));
        Ok(())
    }

    /// Add a record as if another client had, and announce it.
    pub fn insert_external(
        &self,
        collection: Collection,
        record: Record,
    ) -> Result<(), StoreError> {
        let id = record.id.clone();
        {
            let mut state = self.lock();
            let table = state.tables.entry(collection).or_default();
            if table.iter().any(|r| r.id == id) {
                return Err(StoreError::Rejected(format!("duplicate id {id}")));
            }
            table.push(record);
        }
        self.publish(collection, ChangeKind::Insert, Some(id));
        Ok(())
    }

    /// Delete a record as if another client had, and announce it.
    pub fn delete_external(&self, collection: Collection, id: &RecordId) -> Result<(), StoreError> {
        self.lock().remove(collection, id)?;
        self.publish(collection, ChangeKind::Delete, Some(id.clone()));
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, collection: Collection, kind: ChangeKind, record_id: Option<RecordId>) {
        if let Some(feed) = self.feeds.get(&collection) {
            // No subscribers is fine.
            let _ = feed.send(ChangeEvent::new(collection, kind, record_id));
        }
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl MemoryState {
    fn patch(
        &mut self,
        collection: Collection,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> Result<(), StoreError> {
        let record = self
            .tables
            .get_mut(&collection)
            .and_then(|table| table.iter_mut().find(|r| &r.id == id))
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        *record = patch.apply_to(record);
        Ok(())
    }

    fn remove(&mut self, collection: Collection, id: &RecordId) -> Result<(), StoreError> {
        let table = self.tables.entry(collection).or_default();
        let before = table.len();
        table.retain(|r| &r.id != id);
        if table.len() == before {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    fn take_failure(counter: &mut usize) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn read(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        self.delay().await;
        {
            let mut state = self.lock();
            state.reads += 1;
            if MemoryState::take_failure(&mut state.fail_reads) {
                return Err(StoreError::Unavailable("read failed".into()));
            }
        }
        trace!(collection = %collection, "read");
        Ok(self.snapshot(collection))
    }

    async fn write(
        &self,
        collection: Collection,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> Result<(), StoreError> {
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        self.delay().await;
        {
            let mut state = self.lock();
            state.writes += 1;
            if MemoryState::take_failure(&mut state.fail_writes) {
                return Err(StoreError::Unavailable("write failed".into()));
            }
            state.patch(collection, id, patch)?;
        }
        trace!(collection = %collection, record = %id, "write");
        self.publish(collection, ChangeKind::Update, Some(id.clone()));
        Ok(())
    }

    async fn insert(
        &self,
        collection: Collection,
        fields: Map<String, Value>,
    ) -> Result<Record, StoreError> {
        self.delay().await;
        let record = {
            let mut state = self.lock();
            state.clock += 1;
            state.next_id += 1;
            let record = Record {
                id: RecordId::new(format!("{}-{}", collection.table(), state.next_id)),
                status: collection.has_status().then_some(crate::Status::New),
                created_at: state.clock,
                fields,
            };
            state.tables.entry(collection).or_default().push(record.clone());
            record
        };
        trace!(collection = %collection, record = %record.id, "insert");
        self.publish(collection, ChangeKind::Insert, Some(record.id.clone()));
        Ok(record)
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<(), StoreError> {
        self.delay().await;
        self.lock().remove(collection, id)?;
        trace!(collection = %collection, record = %id, "delete");
        self.publish(collection, ChangeKind::Delete, Some(id.clone()));
        Ok(())
    }

    fn subscribe(&self, collection: Collection) -> ChangeFeed {
        match self.feeds.get(&collection) {
            Some(feed) => feed.subscribe(),
            // Every collection has a feed; an unknown one never fires.
            None => broadcast::channel(1).1,
        }
    }
}
