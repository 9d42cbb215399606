//! Dashboard counters.

use serde::Serialize;

use crate::record::Record;
use crate::status::Status;

/// Inquiry counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InquiryStats {
    pub total: usize,
    pub new: usize,
    pub contacted: usize,
    pub completed: usize,
}

impl InquiryStats {
    /// Count over a collection. Records without a status count toward the
    /// total only.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        records.into_iter().fold(Self::default(), |mut stats, record| {
            stats.total += 1;
            match record.status {
                Some(Status::New) => stats.new += 1,
                Some(Status::Contacted) => stats.contacted += 1,
                Some(Status::Completed) => stats.completed += 1,
                None => {}
            }
            stats
        })
    }
}
