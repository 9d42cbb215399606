//! Error types for the sync engine.

use thiserror::Error;

use crate::record::RecordId;
use crate::status::Status;
use crate::store::StoreError;
use crate::Collection;

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the reconciliation engine.
///
/// Cloneable so one write failure can be reported to every caller whose
/// change rode on that write.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The status change is not allowed by the state machine.
    /// Nothing was written, locally or remotely.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    /// A status change was requested on a record that has no status.
    #[error("record {0} has no status")]
    MissingStatus(RecordId),

    /// The record is not in the local collection.
    #[error("unknown record: {0}")]
    UnknownRecord(RecordId),

    /// The patch touches a field the engine owns.
    #[error("field {0:?} cannot be patched")]
    ReservedField(String),

    /// The record has a mutation in flight.
    #[error("record {0} has a pending mutation")]
    Busy(RecordId),

    /// The remote store rejected a write. The local value was rolled back.
    #[error("write to {id} failed: {source}")]
    RemoteWrite {
        id: RecordId,
        #[source]
        source: StoreError,
    },

    /// The remote store could not be read. The local collection is unchanged.
    #[error("reading {collection} failed: {source}")]
    RemoteRead {
        collection: Collection,
        #[source]
        source: StoreError,
    },

    /// Insert or delete failed remotely.
    #[error("{op} in {collection} failed: {source}")]
    Remote {
        op: &'static str,
        collection: Collection,
        #[source]
        source: StoreError,
    },

    /// The reconciler was closed.
    #[error("reconciler is closed")]
    Closed,

    /// No tokio runtime to run remote writes on.
    #[error("no tokio runtime available")]
    NoRuntime,

    /// Unrecognized status name.
    #[error("unknown status: {0}")]
    UnknownStatus(String),

    /// Unrecognized collection name.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
}
