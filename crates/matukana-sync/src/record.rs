//! Record model shared by every admin collection.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::status::Status;

/// Keys that belong to the record envelope, not to its fields.
pub const RESERVED_FIELDS: [&str; 3] = ["id", "status", "created_at"];

/// Opaque, remote-assigned record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for RecordId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One entity: an inquiry, product, therapy, experience or gallery item.
///
/// Owned by the remote store; local copies are caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Remote-assigned id.
    pub id: RecordId,

    /// Follow-up status (inquiries only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    /// Creation time, unix milliseconds.
    #[serde(default)]
    pub created_at: u64,

    /// Everything else (name, price, images, date, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// A record with no status and no fields.
    pub fn new(id: impl Into<RecordId>, created_at: u64) -> Self {
        Self {
            id: id.into(),
            status: None,
            created_at,
            fields: Map::new(),
        }
    }

    /// Set the status.
    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Set a field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Read a field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// A partial update: an optional status plus any number of fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    /// New status, if changing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    /// Fields to overwrite.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl RecordPatch {
    /// Patch that only changes the status.
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            fields: Map::new(),
        }
    }

    /// Patch that sets one field.
    pub fn field(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().with_field(key, value)
    }

    /// Add a field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Nothing to change.
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.fields.is_empty()
    }

    /// Reject patches touching envelope keys.
    pub fn check_fields(&self) -> Result<()> {
        match self.fields.keys().find(|k| RESERVED_FIELDS.contains(&k.as_str())) {
            Some(key) => Err(Error::ReservedField(key.clone())),
            None => Ok(()),
        }
    }

    /// The record with this patch applied.
    pub fn apply_to(&self, record: &Record) -> Record {
        let mut next = record.clone();
        if let Some(status) = self.status {
            next.status = Some(status);
        }
        for (key, value) in &self.fields {
            next.fields.insert(key.clone(), value.clone());
        }
        next
    }

    /// Fold a later patch into this one; the later value wins per key.
    pub fn merge(&mut self, later: RecordPatch) {
        if later.status.is_some() {
            self.status = later.status;
        }
        self.fields.extend(later.fields);
    }
}
