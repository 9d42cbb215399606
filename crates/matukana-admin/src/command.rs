//! Line-oriented admin command protocol.
//!
//! One command per line, words separated by spaces; JSON arguments take the
//! rest of the line. Every command is answered by one JSON [`Response`].
//!
//! ```text
//! list inquiries
//! status 7f3a contacted
//! set products p-12 featured true
//! create gallery {"image_url": "https://...", "caption": "Sahumo"}
//! ```

use std::str::FromStr;

use matukana_sync::{Collection, InquiryStats, Record, RecordId, Status};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Parsed admin command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// List a collection
    List { collection: Collection },
    /// Show one record
    Get { collection: Collection, id: RecordId },
    /// Move an inquiry to a new status
    SetStatus { id: RecordId, status: Status },
    /// Overwrite one field
    Set {
        collection: Collection,
        id: RecordId,
        field: String,
        value: Value,
    },
    /// Create a record
    Create {
        collection: Collection,
        fields: Map<String, Value>,
    },
    /// Delete a record
    Delete { collection: Collection, id: RecordId },
    /// Re-read one collection, or all of them
    Refresh { collection: Option<Collection> },
    /// Inquiry counters
    Stats,
    /// Health check
    Ping,
    /// End the session
    Quit,
}

/// Response to an admin command.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok { message: String },
    Error { error: String },
    Records {
        collection: Collection,
        records: Vec<Record>,
    },
    Record { record: Record },
    Stats { stats: InquiryStats },
    Pong,
}

impl Response {
    /// Plain acknowledgement.
    pub fn ok(message: impl Into<String>) -> Self {
        Self::Ok {
            message: message.into(),
        }
    }

    /// Failure report.
    pub fn error(err: impl std::fmt::Display) -> Self {
        Self::Error {
            error: err.to_string(),
        }
    }
}

/// Command summary.
pub const USAGE: &str = "\
commands:
  list <collection>
  get <collection> <id>
  status <id> <new|contacted|completed>
  set <collection> <id> <field> <json>
  create <collection> <json-object>
  delete <collection> <id>
  refresh [collection]
  stats
  ping
  quit";

/// Split off the first word; the remainder keeps its inner spacing.
fn next_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], input[end..].trim_start()),
        None => (input, ""),
    }
}

fn word<'a>(rest: &mut &'a str, what: &str) -> Result<&'a str> {
    let (word, tail) = next_word(*rest);
    if word.is_empty() {
        return Err(Error::Command(format!("missing {what}")));
    }
    *rest = tail;
    Ok(word)
}

fn collection(rest: &mut &str) -> Result<Collection> {
    Ok(word(rest, "collection")?.parse()?)
}

fn record_id(rest: &mut &str) -> Result<RecordId> {
    word(rest, "record id").map(RecordId::from)
}

fn finish(rest: &str) -> Result<()> {
    if rest.trim().is_empty() {
        Ok(())
    } else {
        Err(Error::Command(format!("unexpected argument: {}", rest.trim())))
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut rest = line.trim();
        let verb = word(&mut rest, "command")?.to_ascii_lowercase();

        let command = match verb.as_str() {
            "list" => Command::List {
                collection: collection(&mut rest)?,
            },
            "get" => Command::Get {
                collection: collection(&mut rest)?,
                id: record_id(&mut rest)?,
            },
            "status" => Command::SetStatus {
                id: record_id(&mut rest)?,
                status: word(&mut rest, "status")?.parse()?,
            },
            "set" => {
                let collection = collection(&mut rest)?;
                let id = record_id(&mut rest)?;
                let field = word(&mut rest, "field")?.to_string();
                if rest.is_empty() {
                    return Err(Error::Command("missing value".into()));
                }
                let value: Value = serde_json::from_str(rest)?;
                rest = "";
                Command::Set {
                    collection,
                    id,
                    field,
                    value,
                }
            }
            "create" => {
                let collection = collection(&mut rest)?;
                let fields = match serde_json::from_str::<Value>(rest)? {
                    Value::Object(fields) => fields,
                    _ => return Err(Error::Command("create expects a JSON object".into())),
                };
                rest = "";
                Command::Create { collection, fields }
            }
            "delete" => Command::Delete {
                collection: collection(&mut rest)?,
                id: record_id(&mut rest)?,
            },
            "refresh" => Command::Refresh {
                collection: match next_word(rest).0 {
                    "" => None,
                    _ => Some(collection(&mut rest)?),
                },
            },
            "stats" => Command::Stats,
            "ping" => Command::Ping,
            "quit" | "exit" => Command::Quit,
            other => return Err(Error::Command(format!("unknown command {other:?}"))),
        };

        finish(rest)?;
        Ok(command)
    }
}
