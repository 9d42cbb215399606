//! Admin collections and their authoritative ordering.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::record::Record;

/// A remote collection edited from the admin dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Contact requests from the public site.
    Inquiries,
    /// Natural products.
    Products,
    /// Therapies and massages.
    Therapies,
    /// Outdoor experiences.
    Experiences,
    /// Gallery images.
    Gallery,
}

/// How the remote store orders a collection on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Newest first.
    CreatedDesc,
    /// Ascending by a field; records missing the field go last.
    FieldAsc(&'static str),
}

impl Collection {
    /// Every collection.
    pub const ALL: [Collection; 5] = [
        Collection::Inquiries,
        Collection::Products,
        Collection::Therapies,
        Collection::Experiences,
        Collection::Gallery,
    ];

    /// Remote table name.
    pub fn table(self) -> &'static str {
        match self {
            Collection::Inquiries => "inquiries",
            Collection::Products => "products",
            Collection::Therapies => "therapies",
            Collection::Experiences => "experiences",
            Collection::Gallery => "gallery",
        }
    }

    /// Read ordering.
    pub fn order(self) -> SortOrder {
        match self {
            Collection::Experiences => SortOrder::FieldAsc("date"),
            Collection::Therapies => SortOrder::FieldAsc("name"),
            _ => SortOrder::CreatedDesc,
        }
    }

    /// Whether records carry a follow-up status.
    pub fn has_status(self) -> bool {
        matches!(self, Collection::Inquiries)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Collection::ALL
            .into_iter()
            .find(|c| c.table().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownCollection(s.to_string()))
    }
}

/// Sort records in place by `order`. Stable, ties broken by id.
pub fn sort_records(records: &mut [Record], order: SortOrder) {
    match order {
        SortOrder::CreatedDesc => records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        }),
        SortOrder::FieldAsc(field) => records.sort_by(|a, b| {
            compare_values(a.field(field), b.field(field)).then_with(|| a.id.cmp(&b.id))
        }),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_table_names() {
        assert_eq!("gallery".parse::<Collection>().unwrap(), Collection::Gallery);
        assert!(matches!(
            "users".parse::<Collection>(),
            Err(Error::UnknownCollection(_))
        ));
    }

    #[test]
    fn newest_first_by_default() {
        let mut records = vec![Record::new("old", 1), Record::new("new", 3), Record::new("mid", 2)];
        sort_records(&mut records, Collection::Products.order());
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["new", "mid", "old"]);
    }

    #[test]
    fn experiences_by_date_missing_last() {
        let mut records = vec![
            Record::new("undated", 9),
            Record::new("march", 1).with_field("date", "2025-03-14"),
            Record::new("january", 2).with_field("date", "2025-01-20"),
        ];
        sort_records(&mut records, Collection::Experiences.order());
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["january", "march", "undated"]);
    }
}
