//! Error types for lesson-engine operations.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// Every engine operation returns one of these kinds on failure. None of them
/// is retried automatically: retrying a write risks a duplicate booking.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    /// A referenced owner or event does not exist (or belongs to another owner).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The requested start is no longer free. Callers re-query and re-prompt.
    #[error("Slot unavailable: {start} is no longer free")]
    SlotUnavailable { start: DateTime<Utc> },

    /// Malformed or out-of-horizon time range, rejected before persistence.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// The day already holds the maximum number of lessons.
    #[error("Quota exceeded: {date} already has {limit} lessons")]
    QuotaExceeded { date: NaiveDate, limit: u32 },

    /// The occurrence has already been cancelled.
    #[error("Duplicate cancellation: {0}")]
    DuplicateCancellation(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Failure reported by the persistence collaborator.
    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
