//! Matukana Sync
//!
//! Local copies of the admin collections, kept consistent with the remote
//! store while the admin edits them.
//!
//! # Overview
//!
//! - [`Status`]: the inquiry follow-up state machine
//!   (`new → contacted → completed → new`).
//! - [`Reconciler`]: one per collection. Applies changes optimistically,
//!   rolls them back exactly when the store refuses, serializes writes per
//!   record, and re-reads the collection whenever the change feed fires
//!   without clobbering changes still in flight.
//! - [`RemoteStore`]: the store boundary. [`MemoryStore`] is the in-process
//!   implementation.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use matukana_sync::{Collection, MemoryStore, Reconciler, Record, RecordId, Status};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> matukana_sync::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! store.seed(Collection::Inquiries, vec![Record::new("q1", 1).with_status(Status::New)]);
//!
//! let inquiries = Reconciler::new(Collection::Inquiries, store)?;
//! inquiries.start().await?;
//!
//! let id = RecordId::from("q1");
//! let ticket = inquiries.mutate(&id, Status::Contacted)?;
//! assert_eq!(inquiries.get(&id).unwrap().status, Some(Status::Contacted));
//! ticket.outcome().await.into_result()?;
//! # Ok(())
//! # }
//! ```

mod collection;
mod error;
mod memory;
mod pending;
mod reconciler;
mod record;
mod stats;
mod status;
mod store;

pub use collection::{sort_records, Collection, SortOrder};
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use pending::{MutationOutcome, MutationState, MutationTicket, PendingMutation};
pub use reconciler::Reconciler;
pub use record::{Record, RecordId, RecordPatch, RESERVED_FIELDS};
pub use stats::InquiryStats;
pub use status::{next_states, validate_transition, Status};
pub use store::{ChangeEvent, ChangeFeed, ChangeKind, RemoteStore, StoreError};
