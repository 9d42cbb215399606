//! Admin dashboard: one reconciler per open collection.

use std::collections::BTreeMap;
use std::sync::Arc;

use matukana_sync::{
    Collection, InquiryStats, Reconciler, Record, RecordId, RecordPatch, RemoteStore, Status,
};
use tracing::{info, warn};

use crate::command::{Command, Response};
use crate::error::{Error, Result};

/// Headless dashboard over the admin collections.
pub struct Dashboard {
    collections: BTreeMap<Collection, Reconciler>,
}

impl Dashboard {
    /// Open and load `collections`.
    ///
    /// A collection whose first load fails still opens, empty; `refresh`
    /// retries it.
    pub async fn open(store: Arc<dyn RemoteStore>, collections: &[Collection]) -> Result<Self> {
        let mut open = BTreeMap::new();
        for &collection in collections {
            let reconciler = Reconciler::new(collection, Arc::clone(&store))?;
            if let Err(e) = reconciler.start().await {
                warn!("Initial load of {} failed: {}", collection, e);
            }
            info!("Opened {} ({} records)", collection, reconciler.len());
            open.insert(collection, reconciler);
        }
        Ok(Self { collections: open })
    }

    /// Collections this dashboard serves.
    pub fn collections(&self) -> impl Iterator<Item = Collection> + '_ {
        self.collections.keys().copied()
    }

    /// The reconciler behind a collection.
    pub fn reconciler(&self, collection: Collection) -> Result<&Reconciler> {
        self.collections
            .get(&collection)
            .ok_or_else(|| Error::Command(format!("collection {collection} is not open")))
    }

    /// Inquiry counters.
    pub fn stats(&self) -> Result<InquiryStats> {
        Ok(self.reconciler(Collection::Inquiries)?.stats())
    }

    /// Advance an inquiry and wait for the store's answer.
    ///
    /// The new status is visible in [`reconciler`](Self::reconciler) before
    /// this returns; on rejection it has already been rolled back.
    pub async fn set_status(&self, id: &RecordId, status: Status) -> Result<Record> {
        let inquiries = self.reconciler(Collection::Inquiries)?;
        let ticket = inquiries.mutate(id, status)?;
        ticket.outcome().await.into_result()?;
        info!("Inquiry {} marked {}", id, status);
        current(inquiries, id)
    }

    /// Overwrite one field and wait for the store's answer.
    pub async fn set_field(
        &self,
        collection: Collection,
        id: &RecordId,
        field: String,
        value: serde_json::Value,
    ) -> Result<Record> {
        let reconciler = self.reconciler(collection)?;
        let ticket = reconciler.update(id, RecordPatch::field(field, value))?;
        ticket.outcome().await.into_result()?;
        current(reconciler, id)
    }

    /// Run one command. Failures become [`Response::Error`].
    pub async fn execute(&self, command: Command) -> Response {
        match self.run(command).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Command failed: {}", e);
                Response::error(e)
            }
        }
    }

    async fn run(&self, command: Command) -> Result<Response> {
        let response = match command {
            Command::List { collection } => Response::Records {
                collection,
                records: self.reconciler(collection)?.records(),
            },
            Command::Get { collection, id } => Response::Record {
                record: current(self.reconciler(collection)?, &id)?,
            },
            Command::SetStatus { id, status } => Response::Record {
                record: self.set_status(&id, status).await?,
            },
            Command::Set {
                collection,
                id,
                field,
                value,
            } => Response::Record {
                record: self.set_field(collection, &id, field, value).await?,
            },
            Command::Create { collection, fields } => Response::Record {
                record: self.reconciler(collection)?.insert(fields).await?,
            },
            Command::Delete { collection, id } => {
                self.reconciler(collection)?.remove(&id).await?;
                Response::ok(format!("Deleted {id} from {collection}"))
            }
            Command::Refresh { collection: Some(collection) } => {
                self.reconciler(collection)?.refresh().await?;
                Response::ok(format!("Refreshed {collection}"))
            }
            Command::Refresh { collection: None } => {
                for reconciler in self.collections.values() {
                    reconciler.refresh().await?;
                }
                Response::ok("Refreshed all collections")
            }
            Command::Stats => Response::Stats {
                stats: self.stats()?,
            },
            Command::Ping => Response::Pong,
            Command::Quit => Response::ok("Bye"),
        };
        Ok(response)
    }

    /// Detach every collection from the store.
    pub fn close(&self) {
        for reconciler in self.collections.values() {
            reconciler.close();
        }
    }
}

fn current(reconciler: &Reconciler, id: &RecordId) -> Result<Record> {
    reconciler
        .get(id)
        .ok_or_else(|| matukana_sync::Error::UnknownRecord(id.clone()).into())
}
