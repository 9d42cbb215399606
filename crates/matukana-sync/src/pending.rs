//! Pending mutations and the tickets callers await.

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::record::{Record, RecordId, RecordPatch};

/// Lifecycle of a local change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    /// Visible locally, write not yet acknowledged.
    Applied,
    /// The store accepted the write.
    Confirmed,
    /// The store rejected the write and `previous` was restored.
    RolledBack,
}

/// A change applied to the local cache ahead of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub record_id: RecordId,
    /// Value to restore on rejection (the last confirmed value).
    pub previous: Record,
    /// Value shown while the write is in flight.
    pub proposed: Record,
    pub state: MutationState,
}

impl PendingMutation {
    pub(crate) fn applied(record_id: RecordId, previous: Record, proposed: Record) -> Self {
        Self {
            record_id,
            previous,
            proposed,
            state: MutationState::Applied,
        }
    }
}

/// How a mutation ended.
#[derive(Debug, Clone)]
pub enum MutationOutcome {
    /// Persisted remotely.
    Confirmed,
    /// Rejected remotely; the local value was restored.
    RolledBack(Error),
    /// The engine was closed before the store answered.
    Abandoned,
}

impl MutationOutcome {
    /// Whether the change was persisted.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }

    /// Collapse into a result. Abandonment is not an error: the view that
    /// asked for the change is gone.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Confirmed | Self::Abandoned => Ok(()),
            Self::RolledBack(err) => Err(err),
        }
    }
}

/// Handle returned by `mutate`/`update`; resolves once the store answers.
#[derive(Debug)]
pub struct MutationTicket {
    record_id: RecordId,
    rx: oneshot::Receiver<MutationOutcome>,
}

impl MutationTicket {
    pub(crate) fn new(record_id: RecordId, rx: oneshot::Receiver<MutationOutcome>) -> Self {
        Self { record_id, rx }
    }

    /// Record this mutation targets.
    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    /// Wait for the outcome.
    pub async fn outcome(self) -> MutationOutcome {
        self.rx.await.unwrap_or(MutationOutcome::Abandoned)
    }
}

pub(crate) type Waiter = oneshot::Sender<MutationOutcome>;

/// Changes made while a write is in flight, folded into one follow-up write.
#[derive(Debug)]
pub(crate) struct QueuedWrite {
    pub(crate) patch: RecordPatch,
    pub(crate) proposed: Record,
    pub(crate) waiters: Vec<Waiter>,
}

/// Per-record bookkeeping: one write in flight, at most one queued.
#[derive(Debug)]
pub(crate) struct PendingSlot {
    pub(crate) mutation: PendingMutation,
    pub(crate) waiters: Vec<Waiter>,
    pub(crate) queued: Option<QueuedWrite>,
}

impl PendingSlot {
    pub(crate) fn new(mutation: PendingMutation, waiter: Waiter) -> Self {
        Self {
            mutation,
            waiters: vec![waiter],
            queued: None,
        }
    }

    /// Queue a change behind the in-flight write, merging with any change
    /// already waiting.
    pub(crate) fn enqueue(&mut self, patch: RecordPatch, proposed: Record, waiter: Waiter) {
        if let Some(queued) = self.queued.as_mut() {
            queued.patch.merge(patch);
            queued.proposed = proposed;
            queued.waiters.push(waiter);
        } else {
            self.queued = Some(QueuedWrite {
                patch,
                proposed,
                waiters: vec![waiter],
            });
        }
    }
}

pub(crate) fn notify(waiters: Vec<Waiter>, outcome: &MutationOutcome) {
    for waiter in waiters {
        // The caller may have dropped its ticket.
        let _ = waiter.send(outcome.clone());
    }
}
