//! Inquiry status state machine.
//!
//! ```text
//!   New ──▶ Contacted ──▶ Completed
//!    ▲                        │
//!    └──────── reopen ────────┘
//! ```
//!
//! Every other transition, including staying in place, is illegal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Follow-up status of an inquiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Just arrived, nobody has answered yet.
    New,
    /// The customer has been contacted.
    Contacted,
    /// Handled.
    Completed,
}

impl Status {
    /// All statuses.
    pub const ALL: [Status; 3] = [Status::New, Status::Contacted, Status::Completed];

    /// Statuses reachable in one step.
    pub fn next_states(self) -> &'static [Status] {
        match self {
            Status::New => &[Status::Contacted],
            Status::Contacted => &[Status::Completed],
            Status::Completed => &[Status::New],
        }
    }

    /// Whether `self → next` is legal.
    pub fn can_transition_to(self, next: Status) -> bool {
        self.next_states().contains(&next)
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Contacted => "contacted",
            Status::Completed => "completed",
        }
    }
}

/// Statuses reachable from `current` in one step.
pub fn next_states(current: Status) -> &'static [Status] {
    current.next_states()
}

/// Check a transition, failing with [`Error::InvalidTransition`].
pub fn validate_transition(from: Status, to: Status) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition { from, to })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownStatus(s.to_string()))
    }
}
