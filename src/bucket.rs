//! Monthly time buckets and the object keys derived from them.
//!
//! Buckets come from the time a submission is *processed*, not from
//! anything inside the submission, so every submission handled during one
//! calendar month lands in the same document.

use crate::error::{TallyError, TallyResult};
use chrono::{DateTime, Datelike, Utc};
use std::fmt;

/// A `(month, year)` partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeBucket {
    /// Calendar month, 1-12.
    pub month: u32,
    pub year: i32,
}

impl TimeBucket {
    /// Build a bucket from explicit values.
    pub fn new(month: u32, year: i32) -> TallyResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(TallyError::MalformedInput(format!(
                "month must be between 1 and 12, got {}",
                month
            )));
        }
        Ok(Self { month, year })
    }

    /// The bucket a given instant falls into.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            month: at.month(),
            year: at.year(),
        }
    }

    /// The bucket for the current processing time.
    pub fn current() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Folder shared by a quiz's raw submissions and its aggregate.
    pub fn prefix(&self, quiz_id: &str) -> String {
        format!("{}/{}/", quiz_id, self)
    }

    /// Object key of the aggregate document for a quiz.
    pub fn aggregate_key(&self, quiz_id: &str) -> String {
        format!("{}{}.json", self.prefix(quiz_id), quiz_id)
    }

    /// Object key of one raw submission.
    pub fn raw_submission_key(&self, quiz_id: &str, submission_id: &str) -> String {
        format!("{}{}.json", self.prefix(quiz_id), submission_id)
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Month is not zero-padded: "6-2020".
        write!(f, "{}-{}", self.month, self.year)
    }
}
