//! Mutation Reconciliation Engine.
//!
//! A [`Reconciler`] owns the local copy of one collection. It keeps three
//! things consistent:
//!
//! - **Optimistic writes.** `mutate`/`update` change the cache before the
//!   store answers, and restore the exact previous value if the store says no.
//! - **One write per record.** A change made while the record's write is in
//!   flight is shown immediately but its write waits; changes that pile up
//!   behind it merge into a single follow-up write.
//! - **The change feed.** Any remote change triggers a full re-read. Records
//!   with unresolved local changes keep their local value through the merge.
//!
//! All state sits behind one mutex that is never held across an await, so
//! feed refreshes and writes interleave freely without locking out the UI.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::pending::{
    notify, MutationOutcome, MutationState, MutationTicket, PendingMutation, PendingSlot,
};
use crate::record::{Record, RecordId, RecordPatch, RESERVED_FIELDS};
use crate::stats::InquiryStats;
use crate::status::{validate_transition, Status};
use crate::store::{ChangeFeed, RemoteStore, StoreError};

/// Resolved mutations kept for inspection.
const RECENT_CAPACITY: usize = 32;

/// Local cache of one collection, reconciled against a [`RemoteStore`].
///
/// Dropping the reconciler closes it.
pub struct Reconciler {
    shared: Arc<Shared>,
}

struct Shared {
    collection: Collection,
    store: Arc<dyn RemoteStore>,
    runtime: Handle,
    cache: Mutex<Cache>,
    feed_task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Default)]
struct Cache {
    records: Vec<Record>,
    pending: HashMap<RecordId, PendingSlot>,
    recent: VecDeque<PendingMutation>,
    closed: bool,
    refreshes_in_flight: usize,
    refresh_issued: u64,
    refresh_applied: u64,
    /// Bumped every time a local write resolves.
    epoch: u64,
    /// Epoch at which each record last resolved locally.
    settled_at: HashMap<RecordId, u64>,
}

impl Reconciler {
    /// Create an empty, unsubscribed reconciler.
    ///
    /// Must be called from within a tokio runtime; writes are spawned on it.
    pub fn new(collection: Collection, store: Arc<dyn RemoteStore>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        Ok(Self {
            shared: Arc::new(Shared {
                collection,
                store,
                runtime,
                cache: Mutex::new(Cache::default()),
                feed_task: Mutex::new(None),
            }),
        })
    }

    /// Subscribe to the change feed and load the collection.
    ///
    /// The subscription is taken before the initial read so no change can
    /// slip between the two.
    pub async fn start(&self) -> Result<()> {
        let feed = self.shared.store.subscribe(self.shared.collection);
        let task = self
            .shared
            .runtime
            .spawn(listen(Arc::downgrade(&self.shared), feed));
        if let Some(previous) = self.shared.lock_feed().replace(task) {
            previous.abort();
        }
        info!(collection = %self.shared.collection, "reconciler started");
        self.refresh().await
    }

    /// Collection this reconciler mirrors.
    pub fn collection(&self) -> Collection {
        self.shared.collection
    }

    /// Snapshot of the local collection, in store order.
    pub fn records(&self) -> Vec<Record> {
        self.shared.lock().records.clone()
    }

    /// One record from the local collection.
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        let cache = self.shared.lock();
        cache.records.iter().find(|r| &r.id == id).cloned()
    }

    /// Number of local records.
    pub fn len(&self) -> usize {
        self.shared.lock().records.len()
    }

    /// Check if the local collection is empty.
    pub fn is_empty(&self) -> bool {
        self.shared.lock().records.is_empty()
    }

    /// The unresolved mutation on a record, if any.
    pub fn pending(&self, id: &RecordId) -> Option<PendingMutation> {
        self.shared.lock().pending.get(id).map(|slot| slot.mutation.clone())
    }

    /// Whether a change is queued behind the record's in-flight write.
    pub fn has_queued(&self, id: &RecordId) -> bool {
        self.shared
            .lock()
            .pending
            .get(id)
            .is_some_and(|slot| slot.queued.is_some())
    }

    /// Recently resolved mutations, oldest first.
    pub fn recent_resolutions(&self) -> Vec<PendingMutation> {
        self.shared.lock().recent.iter().cloned().collect()
    }

    /// Whether a refresh is in flight.
    pub fn is_loading(&self) -> bool {
        self.shared.lock().refreshes_in_flight > 0
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Status counts over the local collection.
    pub fn stats(&self) -> InquiryStats {
        InquiryStats::from_records(&self.shared.lock().records)
    }

    /// Change a record's status.
    ///
    /// Returns as soon as the cache shows the new status. Illegal transitions
    /// fail here, before anything is written.
    pub fn mutate(&self, id: &RecordId, status: Status) -> Result<MutationTicket> {
        self.update(id, RecordPatch::status(status))
    }

    /// Apply an arbitrary patch optimistically.
    ///
    /// A status in the patch goes through the state machine; field keys are
    /// checked against the reserved envelope keys. Once closed, nothing is
    /// applied or written and the ticket resolves as abandoned.
    pub fn update(&self, id: &RecordId, patch: RecordPatch) -> Result<MutationTicket> {
        patch.check_fields()?;
        let (tx, rx) = tokio::sync::oneshot::channel();

        let mut guard = self.shared.lock();
        if guard.closed {
            debug!(record = %id, "change after close; abandoned");
            drop(tx);
            return Ok(MutationTicket::new(id.clone(), rx));
        }
        let cache = &mut *guard;
        let index = cache
            .records
            .iter()
            .position(|r| &r.id == id)
            .ok_or_else(|| Error::UnknownRecord(id.clone()))?;
        let current = cache.records[index].clone();

        if let Some(next) = patch.status {
            let from = current.status.ok_or_else(|| Error::MissingStatus(id.clone()))?;
            validate_transition(from, next)?;
        }

        let proposed = patch.apply_to(&current);
        cache.records[index] = proposed.clone();

        let write = match cache.pending.get_mut(id) {
            Some(slot) => {
                debug!(record = %id, "change queued behind in-flight write");
                slot.enqueue(patch, proposed, tx);
                None
            }
            None => {
                debug!(record = %id, status = ?patch.status, "change applied optimistically");
                let mutation = PendingMutation::applied(id.clone(), current, proposed);
                cache.pending.insert(id.clone(), PendingSlot::new(mutation, tx));
                Some(patch)
            }
        };
        drop(guard);

        if let Some(patch) = write {
            spawn_write(&self.shared, id.clone(), patch);
        }
        Ok(MutationTicket::new(id.clone(), rx))
    }

    /// Re-read the whole collection and merge it into the cache.
    ///
    /// On failure the cache is left as it was.
    pub async fn refresh(&self) -> Result<()> {
        self.shared.refresh().await
    }

    /// Create a record. Ids are assigned remotely, so this is not optimistic:
    /// the record appears once the follow-up refresh lands.
    pub async fn insert(&self, fields: Map<String, Value>) -> Result<Record> {
        if let Some(key) = fields.keys().find(|k| RESERVED_FIELDS.contains(&k.as_str())) {
            return Err(Error::ReservedField(key.clone()));
        }
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let collection = self.shared.collection;
        let record = self
            .shared
            .store
            .insert(collection, fields)
            .await
            .map_err(|source| Error::Remote {
                op: "insert",
                collection,
                source,
            })?;
        info!(collection = %collection, record = %record.id, "record created");

        if let Err(err) = self.refresh().await {
            warn!(error = %err, "refresh after insert failed");
        }
        Ok(record)
    }

    /// Delete a record, refused while it has an unresolved change.
    pub async fn remove(&self, id: &RecordId) -> Result<()> {
        {
            let cache = self.shared.lock();
            if cache.closed {
                return Err(Error::Closed);
            }
            if cache.pending.contains_key(id) {
                return Err(Error::Busy(id.clone()));
            }
        }
        let collection = self.shared.collection;
        self.shared
            .store
            .delete(collection, id)
            .await
            .map_err(|source| Error::Remote {
                op: "delete",
                collection,
                source,
            })?;
        info!(collection = %collection, record = %id, "record deleted");

        {
            let mut cache = self.shared.lock();
            if !cache.closed && !cache.pending.contains_key(id) {
                cache.records.retain(|r| &r.id != id);
            }
        }
        if let Err(err) = self.refresh().await {
            warn!(error = %err, "refresh after delete failed");
        }
        Ok(())
    }

    /// Detach from the store.
    ///
    /// Stops the feed listener. Writes and reads still in flight are ignored
    /// when they land, and outstanding tickets resolve as
    /// [`MutationOutcome::Abandoned`].
    pub fn close(&self) {
        let abandoned = {
            let mut cache = self.shared.lock();
            if cache.closed {
                return;
            }
            cache.closed = true;
            let abandoned = cache.pending.len();
            cache.pending.clear();
            abandoned
        };
        if let Some(task) = self.shared.lock_feed().take() {
            task.abort();
        }
        debug!(collection = %self.shared.collection, abandoned, "reconciler closed");
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("collection", &self.shared.collection)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_feed(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.feed_task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn refresh(&self) -> Result<()> {
        let (generation, started_epoch) = {
            let mut cache = self.lock();
            if cache.closed {
                return Ok(());
            }
            cache.refresh_issued += 1;
            cache.refreshes_in_flight += 1;
            (cache.refresh_issued, cache.epoch)
        };

        let fetched = self.store.read(self.collection).await;

        let mut cache = self.lock();
        cache.refreshes_in_flight = cache.refreshes_in_flight.saturating_sub(1);
        if cache.closed {
            debug!(collection = %self.collection, "refresh landed after close; ignored");
            return Ok(());
        }

        let result = match fetched {
            Err(source) => {
                warn!(
                    collection = %self.collection,
                    error = %source,
                    "refresh failed; keeping cached records"
                );
                Err(Error::RemoteRead {
                    collection: self.collection,
                    source,
                })
            }
            Ok(_) if generation < cache.refresh_applied => {
                debug!(collection = %self.collection, generation, "stale refresh discarded");
                Ok(())
            }
            Ok(records) => {
                cache.refresh_applied = generation;
                let kept = cache.merge(records, started_epoch);
                debug!(
                    collection = %self.collection,
                    records = cache.records.len(),
                    kept_local = kept,
                    "refresh applied"
                );
                Ok(())
            }
        };

        if cache.refreshes_in_flight == 0 {
            cache.settled_at.clear();
        }
        result
    }

    /// Record the store's answer for the in-flight write on `id`.
    /// Returns the queued follow-up write, if any.
    fn settle(
        &self,
        id: &RecordId,
        result: std::result::Result<(), StoreError>,
    ) -> Option<RecordPatch> {
        let mut guard = self.lock();
        let cache = &mut *guard;
        if cache.closed {
            debug!(record = %id, "write landed after close; ignored");
            return None;
        }
        let PendingSlot {
            mut mutation,
            waiters,
            queued,
        } = cache.pending.remove(id)?;

        cache.epoch += 1;
        cache.settled_at.insert(id.clone(), cache.epoch);

        match result {
            Ok(()) => {
                mutation.state = MutationState::Confirmed;
                debug!(record = %id, "write confirmed");
                notify(waiters, &MutationOutcome::Confirmed);

                let follow_up = queued.map(|queued| {
                    let next = PendingMutation::applied(
                        id.clone(),
                        mutation.proposed.clone(),
                        queued.proposed,
                    );
                    cache.pending.insert(
                        id.clone(),
                        PendingSlot {
                            mutation: next,
                            waiters: queued.waiters,
                            queued: None,
                        },
                    );
                    queued.patch
                });
                cache.remember(mutation);
                follow_up
            }
            Err(source) => {
                mutation.state = MutationState::RolledBack;
                if let Some(record) = cache.records.iter_mut().find(|r| &r.id == id) {
                    *record = mutation.previous.clone();
                }
                let error = Error::RemoteWrite {
                    id: id.clone(),
                    source,
                };
                warn!(
                    record = %id,
                    error = %error,
                    dropped_queued = queued.is_some(),
                    "write rejected; rolled back"
                );

                let outcome = MutationOutcome::RolledBack(error);
                notify(waiters, &outcome);
                if let Some(queued) = queued {
                    notify(queued.waiters, &outcome);
                }
                cache.remember(mutation);
                None
            }
        }
    }
}

impl Cache {
    /// Merge a fresh read into the cache.
    ///
    /// The store's order wins. A record keeps its local value if it has an
    /// unresolved change, or if a local write on it resolved after this read
    /// started (the read may predate that write). Records with unresolved
    /// changes that the read no longer contains stay until they resolve.
    fn merge(&mut self, fetched: Vec<Record>, started_epoch: u64) -> usize {
        let mut local: HashMap<RecordId, Record> = self
            .records
            .drain(..)
            .map(|record| (record.id.clone(), record))
            .collect();
        let mut merged = Vec::with_capacity(fetched.len());
        let mut kept = 0;

        for remote in fetched {
            let prefer_local = self.pending.contains_key(&remote.id)
                || self
                    .settled_at
                    .get(&remote.id)
                    .is_some_and(|&epoch| epoch > started_epoch);
            match local.remove(&remote.id) {
                Some(mine) if prefer_local => {
                    kept += 1;
                    merged.push(mine);
                }
                _ => merged.push(remote),
            }
        }

        for id in self.pending.keys() {
            if let Some(mine) = local.remove(id) {
                kept += 1;
                merged.push(mine);
            }
        }

        self.records = merged;
        kept
    }

    fn remember(&mut self, mutation: PendingMutation) {
        if self.recent.len() == RECENT_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(mutation);
    }
}

fn spawn_write(shared: &Arc<Shared>, id: RecordId, patch: RecordPatch) {
    let task_shared = Arc::clone(shared);
    shared.runtime.spawn(async move {
        let shared = task_shared;
        let mut patch = patch;
        loop {
            let result = shared.store.write(shared.collection, &id, &patch).await;
            match shared.settle(&id, result) {
                Some(next) => {
                    debug!(record = %id, "issuing queued write");
                    patch = next;
                }
                None => break,
            }
        }
    });
}

/// Feed listener: one refresh per burst of change events.
async fn listen(shared: Weak<Shared>, mut feed: ChangeFeed) {
    loop {
        let first = match feed.recv().await {
            Ok(event) => Some(event),
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "change feed lagged");
                None
            }
            Err(RecvError::Closed) => break,
        };

        let mut coalesced = 0usize;
        loop {
            match feed.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => coalesced += 1,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        let Some(engine) = shared.upgrade() else {
            break;
        };
        if engine.lock().closed {
            break;
        }
        trace!(collection = %engine.collection, event = ?first, coalesced, "remote change");
        if let Err(err) = engine.refresh().await {
            warn!(error = %err, "refresh after remote change failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio_test::{assert_pending, assert_ready};

    type StoreResult<T> = std::result::Result<T, StoreError>;

    fn inquiry(id: &str, created_at: u64, status: Status) -> Record {
        Record::new(id, created_at)
            .with_status(status)
            .with_field("item_name", "Masaje relajante")
            .with_field("type", "therapy")
    }

    async fn inquiries(records: Vec<Record>) -> (Arc<MemoryStore>, Reconciler) {
        let store = Arc::new(MemoryStore::new());
        store.seed(Collection::Inquiries, records);
        let reconciler = Reconciler::new(Collection::Inquiries, store.clone()).unwrap();
        reconciler.refresh().await.unwrap();
        (store, reconciler)
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    fn id(s: &str) -> RecordId {
        RecordId::from(s)
    }

    /// Store whose reads take their snapshot at once but only return when
    /// the matching gate opens, so reads can land in any order.
    struct GatedReads {
        inner: MemoryStore,
        gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    }

    impl GatedReads {
        fn new(inner: MemoryStore) -> Arc<Self> {
            Arc::new(Self {
                inner,
                gates: Mutex::new(VecDeque::new()),
            })
        }

        /// Hold the next read until the returned sender fires.
        fn gate(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().push_back(rx);
            tx
        }
    }

    #[async_trait]
    impl RemoteStore for GatedReads {
        async fn read(&self, collection: Collection) -> StoreResult<Vec<Record>> {
            let snapshot = self.inner.read(collection).await;
            let gate = self.gates.lock().unwrap().pop_front();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            snapshot
        }

        async fn write(
            &self,
            collection: Collection,
            id: &RecordId,
            patch: &RecordPatch,
        ) -> StoreResult<()> {
            self.inner.write(collection, id, patch).await
        }

        async fn insert(
            &self,
            collection: Collection,
            fields: Map<String, Value>,
        ) -> StoreResult<Record> {
            self.inner.insert(collection, fields).await
        }

        async fn delete(&self, collection: Collection, id: &RecordId) -> StoreResult<()> {
            self.inner.delete(collection, id).await
        }

        fn subscribe(&self, collection: Collection) -> ChangeFeed {
            self.inner.subscribe(collection)
        }
    }

    async fn gated(records: Vec<Record>) -> (Arc<GatedReads>, Reconciler) {
        let inner = MemoryStore::new();
        inner.seed(Collection::Inquiries, records);
        let store = GatedReads::new(inner);
        let reconciler = Reconciler::new(Collection::Inquiries, store.clone()).unwrap();
        reconciler.refresh().await.unwrap();
        (store, reconciler)
    }

    #[tokio::test]
    async fn change_is_visible_before_store_answers() {
        let (store, reconciler) = inquiries(vec![inquiry("q1", 1, Status::New)]).await;
        store.hold_writes();

        let ticket = reconciler.mutate(&id("q1"), Status::Contacted).unwrap();
        assert_eq!(reconciler.get(&id("q1")).unwrap().status, Some(Status::Contacted));
        let pending = reconciler.pending(&id("q1")).unwrap();
        assert_eq!(pending.state, MutationState::Applied);
        assert_eq!(pending.previous.status, Some(Status::New));

        let mut outcome = tokio_test::task::spawn(ticket.outcome());
        tokio::task::yield_now().await;
        assert_pending!(outcome.poll());

        store.release_writes();
        eventually(|| outcome.is_woken()).await;
        assert!(assert_ready!(outcome.poll()).is_confirmed());
        assert!(reconciler.pending(&id("q1")).is_none());
        assert_eq!(
            store.snapshot(Collection::Inquiries)[0].status,
            Some(Status::Contacted)
        );
    }

    #[tokio::test]
    async fn rejected_write_restores_exact_value() {
        let original =
            inquiry("q1", 1, Status::New).with_field("message", "¿Tienen turnos el lunes?");
        let (store, reconciler) = inquiries(vec![original.clone()]).await;
        store.fail_next_writes(1);

        let before = reconciler.get(&id("q1")).unwrap();
        let ticket = reconciler.mutate(&id("q1"), Status::Contacted).unwrap();
        let outcome = ticket.outcome().await;

        assert!(matches!(
            outcome,
            MutationOutcome::RolledBack(Error::RemoteWrite { .. })
        ));
        assert_eq!(reconciler.get(&id("q1")).unwrap(), before);
        assert_eq!(before, original);

        let resolved = reconciler.recent_resolutions();
        assert_eq!(resolved.last().unwrap().state, MutationState::RolledBack);
    }

    #[tokio::test]
    async fn illegal_transition_writes_nothing() {
        let (store, reconciler) = inquiries(vec![inquiry("q1", 1, Status::New)]).await;

        let err = reconciler.mutate(&id("q1"), Status::Completed).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: Status::New,
                to: Status::Completed
            }
        ));
        assert_eq!(reconciler.get(&id("q1")).unwrap().status, Some(Status::New));
        assert!(reconciler.pending(&id("q1")).is_none());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn reopen_cycle() {
        let (_store, reconciler) = inquiries(vec![inquiry("q1", 1, Status::New)]).await;

        for next in [Status::Contacted, Status::Completed, Status::New, Status::Contacted] {
            let ticket = reconciler.mutate(&id("q1"), next).unwrap();
            assert!(ticket.outcome().await.is_confirmed());
        }
        let ticket = reconciler.mutate(&id("q1"), Status::Completed).unwrap();
        assert!(ticket.outcome().await.is_confirmed());

        assert!(matches!(
            reconciler.mutate(&id("q1"), Status::Contacted),
            Err(Error::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn refresh_does_not_clobber_unconfirmed_change() {
        let (store, reconciler) =
            inquiries(vec![inquiry("q1", 2, Status::New), inquiry("q2", 1, Status::New)]).await;
        store.hold_writes();

        let ticket = reconciler.mutate(&id("q1"), Status::Contacted).unwrap();
        store
            .apply_external(
                Collection::Inquiries,
                &id("q2"),
                &RecordPatch::status(Status::Contacted),
            )
            .unwrap();
        reconciler.refresh().await.unwrap();

        // Local change survives; the other record takes the remote value.
        assert_eq!(reconciler.get(&id("q1")).unwrap().status, Some(Status::Contacted));
        assert_eq!(reconciler.get(&id("q2")).unwrap().status, Some(Status::Contacted));
        assert_eq!(
            store.snapshot(Collection::Inquiries)[0].status,
            Some(Status::New)
        );

        store.release_writes();
        assert!(ticket.outcome().await.is_confirmed());
    }

    #[tokio::test]
    async fn second_change_waits_for_first_write() {
        let (store, reconciler) = inquiries(vec![inquiry("q1", 1, Status::New)]).await;
        store.hold_writes();

        let first = reconciler.mutate(&id("q1"), Status::Contacted).unwrap();
        let second = reconciler.mutate(&id("q1"), Status::Completed).unwrap();

        assert_eq!(reconciler.get(&id("q1")).unwrap().status, Some(Status::Completed));
        assert!(reconciler.has_queued(&id("q1")));
        // The in-flight mutation still rolls back to the confirmed value.
        assert_eq!(
            reconciler.pending(&id("q1")).unwrap().previous.status,
            Some(Status::New)
        );

        store.release_writes();
        assert!(first.outcome().await.is_confirmed());
        assert!(second.outcome().await.is_confirmed());
        assert_eq!(store.write_count(), 2);
        assert_eq!(
            store.snapshot(Collection::Inquiries)[0].status,
            Some(Status::Completed)
        );
    }

    #[tokio::test]
    async fn queued_change_rolls_back_with_failed_write() {
        let original = inquiry("q1", 1, Status::New);
        let (store, reconciler) = inquiries(vec![original.clone()]).await;
        store.hold_writes();
        store.fail_next_writes(1);

        let first = reconciler.mutate(&id("q1"), Status::Contacted).unwrap();
        let second = reconciler.mutate(&id("q1"), Status::Completed).unwrap();
        store.release_writes();

        assert!(matches!(first.outcome().await, MutationOutcome::RolledBack(_)));
        assert!(matches!(second.outcome().await, MutationOutcome::RolledBack(_)));
        assert_eq!(reconciler.get(&id("q1")).unwrap(), original);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn closed_reconciler_ignores_late_results() {
        let (store, reconciler) = inquiries(vec![inquiry("q1", 1, Status::New)]).await;
        store.hold_writes();
        store.fail_next_writes(1);

        let ticket = reconciler.mutate(&id("q1"), Status::Contacted).unwrap();
        reconciler.close();
        store.release_writes();

        assert!(matches!(ticket.outcome().await, MutationOutcome::Abandoned));
        // Give the write task time to land; the rollback must not happen.
        eventually(|| store.write_count() == 1).await;
        tokio::task::yield_now().await;
        assert_eq!(reconciler.get(&id("q1")).unwrap().status, Some(Status::Contacted));
        assert!(reconciler.refresh().await.is_ok());
    }

    #[tokio::test]
    async fn change_after_close_is_abandoned_without_writing() {
        let (store, reconciler) = inquiries(vec![inquiry("q1", 1, Status::New)]).await;
        reconciler.close();
        let before = reconciler.get(&id("q1")).unwrap();

        let ticket = reconciler.mutate(&id("q1"), Status::Contacted).unwrap();
        assert!(matches!(ticket.outcome().await, MutationOutcome::Abandoned));
        assert_eq!(reconciler.get(&id("q1")).unwrap(), before);
        assert!(reconciler.pending(&id("q1")).is_none());

        assert!(matches!(reconciler.insert(Map::new()).await, Err(Error::Closed)));
        assert!(matches!(reconciler.remove(&id("q1")).await, Err(Error::Closed)));

        tokio::task::yield_now().await;
        assert_eq!(store.write_count(), 0);
        let remote = store.snapshot(Collection::Inquiries);
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].status, Some(Status::New));
    }

    #[tokio::test]
    async fn older_read_landing_last_is_discarded() {
        let (store, reconciler) = gated(vec![inquiry("q1", 1, Status::New)]).await;

        let release_old = store.gate();
        let mut old = tokio_test::task::spawn(reconciler.refresh());
        assert_pending!(old.poll());
        assert!(reconciler.is_loading());

        let contacted = RecordPatch::status(Status::Contacted);
        store
            .inner
            .apply_external(Collection::Inquiries, &id("q1"), &contacted)
            .unwrap();
        let release_new = store.gate();
        let mut new = tokio_test::task::spawn(reconciler.refresh());
        assert_pending!(new.poll());

        release_new.send(()).unwrap();
        assert_ready!(new.poll()).unwrap();
        assert_eq!(reconciler.get(&id("q1")).unwrap().status, Some(Status::Contacted));
        assert!(reconciler.is_loading());

        release_old.send(()).unwrap();
        assert_ready!(old.poll()).unwrap();
        assert_eq!(reconciler.get(&id("q1")).unwrap().status, Some(Status::Contacted));
        assert!(!reconciler.is_loading());
    }

    #[tokio::test]
    async fn read_in_flight_at_close_is_ignored() {
        let (store, reconciler) = gated(vec![inquiry("q1", 1, Status::New)]).await;
        let contacted = RecordPatch::status(Status::Contacted);
        store
            .inner
            .apply_external(Collection::Inquiries, &id("q1"), &contacted)
            .unwrap();

        let release = store.gate();
        let mut refresh = tokio_test::task::spawn(reconciler.refresh());
        assert_pending!(refresh.poll());

        reconciler.close();
        release.send(()).unwrap();
        assert_ready!(refresh.poll()).unwrap();
        assert_eq!(reconciler.get(&id("q1")).unwrap().status, Some(Status::New));
        assert!(!reconciler.is_loading());
    }

    #[tokio::test]
    async fn failed_read_keeps_cache() {
        let (store, reconciler) = inquiries(vec![inquiry("q1", 1, Status::New)]).await;
        store
            .apply_external(
                Collection::Inquiries,
                &id("q1"),
                &RecordPatch::status(Status::Contacted),
            )
            .unwrap();
        store.fail_next_reads(1);

        let err = reconciler.refresh().await.unwrap_err();
        assert!(matches!(err, Error::RemoteRead { .. }));
        assert_eq!(reconciler.get(&id("q1")).unwrap().status, Some(Status::New));
        assert!(!reconciler.is_loading());
    }

    #[tokio::test]
    async fn change_feed_triggers_refresh() {
        let store = Arc::new(MemoryStore::new());
        store.seed(Collection::Inquiries, vec![inquiry("q1", 1, Status::New)]);
        let reconciler = Reconciler::new(Collection::Inquiries, store.clone()).unwrap();
        reconciler.start().await.unwrap();
        assert_eq!(reconciler.len(), 1);

        store
            .insert_external(
                Collection::Inquiries,
                Record::new("q2", 5).with_status(Status::New).with_field("type", "product"),
            )
            .unwrap();
        eventually(|| reconciler.len() == 2).await;
        // Newest first.
        assert_eq!(reconciler.records()[0].id, id("q2"));
    }

    async fn burst_of_edits(edits: usize) {
        let store = Arc::new(MemoryStore::new());
        store.seed(Collection::Inquiries, vec![inquiry("q1", 1, Status::New)]);
        let reconciler = Reconciler::new(Collection::Inquiries, store.clone()).unwrap();
        reconciler.start().await.unwrap();
        let reads = store.read_count();

        for n in 1..=edits {
            let patch = RecordPatch::field("message", format!("edit {n}"));
            store
                .apply_external(Collection::Inquiries, &id("q1"), &patch)
                .unwrap();
        }

        let last = Value::from(format!("edit {edits}"));
        eventually(|| reconciler.get(&id("q1")).unwrap().field("message") == Some(&last)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.read_count(), reads + 1);
    }

    #[tokio::test]
    async fn burst_of_remote_changes_costs_one_read() {
        burst_of_edits(10).await;
    }

    #[tokio::test]
    async fn lagged_feed_still_refreshes_once() {
        // More edits than the feed holds.
        burst_of_edits(100).await;
    }

    #[tokio::test]
    async fn field_updates_are_optimistic_too() {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            Collection::Products,
            vec![Record::new("p1", 1)
                .with_field("name", "Ungüento de árnica")
                .with_field("featured", false)],
        );
        let reconciler = Reconciler::new(Collection::Products, store.clone()).unwrap();
        reconciler.refresh().await.unwrap();

        let ticket = reconciler
            .update(&id("p1"), RecordPatch::field("featured", true))
            .unwrap();
        assert_eq!(
            reconciler.get(&id("p1")).unwrap().field("featured"),
            Some(&Value::Bool(true))
        );
        assert!(ticket.outcome().await.is_confirmed());

        assert!(matches!(
            reconciler.mutate(&id("p1"), Status::Contacted),
            Err(Error::MissingStatus(_))
        ));
        assert!(matches!(
            reconciler.update(&id("p1"), RecordPatch::field("id", "x")),
            Err(Error::ReservedField(_))
        ));
        assert!(matches!(
            reconciler.mutate(&id("nope"), Status::Contacted),
            Err(Error::UnknownRecord(_))
        ));
    }

    #[tokio::test]
    async fn insert_and_remove_go_through_store() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(Collection::Gallery, store.clone()).unwrap();
        reconciler.refresh().await.unwrap();

        let mut fields = Map::new();
        fields.insert("image_url".into(), Value::from("https://example.com/sahumo.jpg"));
        let created = reconciler.insert(fields).await.unwrap();
        assert_eq!(reconciler.len(), 1);

        reconciler.remove(&created.id).await.unwrap();
        assert!(reconciler.is_empty());
    }

    #[tokio::test]
    async fn remove_refused_while_pending() {
        let (store, reconciler) = inquiries(vec![inquiry("q1", 1, Status::New)]).await;
        store.hold_writes();
        let ticket = reconciler.mutate(&id("q1"), Status::Contacted).unwrap();

        assert!(matches!(reconciler.remove(&id("q1")).await, Err(Error::Busy(_))));

        store.release_writes();
        assert!(ticket.outcome().await.is_confirmed());
    }

    #[test]
    fn requires_runtime() {
        let store = Arc::new(MemoryStore::new());
        assert!(matches!(
            Reconciler::new(Collection::Inquiries, store),
            Err(Error::NoRuntime)
        ));
    }

    #[test]
    fn merge_keeps_records_settled_after_read_started() {
        let mut cache = Cache {
            records: vec![inquiry("q1", 1, Status::Contacted)],
            ..Cache::default()
        };
        cache.epoch = 3;
        cache.settled_at.insert(id("q1"), 3);

        // Read started at epoch 2, before q1's write confirmed.
        let kept = cache.merge(vec![inquiry("q1", 1, Status::New)], 2);
        assert_eq!(kept, 1);
        assert_eq!(cache.records[0].status, Some(Status::Contacted));

        // A read started after the write takes the remote value.
        let kept = cache.merge(vec![inquiry("q1", 1, Status::Completed)], 3);
        assert_eq!(kept, 0);
        assert_eq!(cache.records[0].status, Some(Status::Completed));
    }
}
