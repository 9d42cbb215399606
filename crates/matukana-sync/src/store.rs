//! Remote store boundary.
//!
//! The engine needs only this shape from the backing store: read a whole
//! collection, patch one record, insert, delete, and a change feed. Transport,
//! auth and schema live behind the trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::collection::Collection;
use crate::record::{Record, RecordId, RecordPatch};

/// Failure reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached or timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The record does not exist remotely.
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// The store refused the operation (constraint, permission, ...).
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Kind of remote change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Notification from the store's change feed.
///
/// Events carry no payload the engine relies on; any event means "the
/// collection may have changed".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
}

impl ChangeEvent {
    /// Build an event.
    pub fn new(collection: Collection, kind: ChangeKind, record_id: Option<RecordId>) -> Self {
        Self {
            collection,
            kind,
            record_id,
        }
    }
}

/// Subscription to a collection's change feed. Dropping it unsubscribes.
pub type ChangeFeed = broadcast::Receiver<ChangeEvent>;

/// Client for the authoritative store.
///
/// Each call resolves exactly once; retries and timeouts are the
/// implementation's business.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the whole collection in its authoritative order.
    async fn read(&self, collection: Collection) -> Result<Vec<Record>, StoreError>;

    /// Apply a patch to one record.
    async fn write(
        &self,
        collection: Collection,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> Result<(), StoreError>;

    /// Create a record; the store assigns the id and timestamp.
    async fn insert(
        &self,
        collection: Collection,
        fields: Map<String, Value>,
    ) -> Result<Record, StoreError>;

    /// Delete a record.
    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<(), StoreError>;

    /// Subscribe to changes in a collection.
    fn subscribe(&self, collection: Collection) -> ChangeFeed;
}
