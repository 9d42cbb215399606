//! Section identifiers and the ordered set of tracked sections.

use std::borrow::Borrow;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a page section (the `id` attribute of its `<section>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct SectionId(String);

impl SectionId {
    /// Create a section id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for SectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for SectionId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SectionId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Ordered, duplicate-free list of tracked section ids.
///
/// Order matters: it breaks ties between sections that are equally close to
/// the viewport center. Empty ids are dropped and a repeated id keeps its
/// first position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedSections {
    ids: Vec<SectionId>,
}

impl TrackedSections {
    /// Build from any list of ids.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SectionId>,
    {
        let mut tracked = Vec::new();
        for id in ids {
            let id = id.into();
            if id.as_str().is_empty() || tracked.contains(&id) {
                continue;
            }
            tracked.push(id);
        }
        Self { ids: tracked }
    }

    /// Whether `id` is tracked.
    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Position of `id` in tracking order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|s| s.as_str() == id)
    }

    /// Look up the tracked id equal to `id`.
    pub fn find(&self, id: &str) -> Option<&SectionId> {
        self.ids.iter().find(|s| s.as_str() == id)
    }

    /// First tracked id.
    pub fn first(&self) -> Option<&SectionId> {
        self.ids.first()
    }

    /// Iterate in tracking order.
    pub fn iter(&self) -> impl Iterator<Item = &SectionId> {
        self.ids.iter()
    }

    /// Number of tracked sections.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<S: Into<SectionId>> FromIterator<S> for TrackedSections {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}
