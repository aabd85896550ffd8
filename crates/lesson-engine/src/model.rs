//! Calendar data model: owners, participants, one-off and recurring events,
//! cancellations, and the derived [`Occurrence`] every other module works with.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};

/// The resource whose calendar is scheduled (the teacher).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub u64);

impl OwnerId {
    /// The owner's own participant identity. Events about the teacher
    /// themselves (work hours, breaks, their vacations) use this subject.
    pub fn participant(self) -> ParticipantId {
        ParticipantId(self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner {}", self.0)
    }
}

/// A teacher or student named as the subject of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "participant {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SingleEventId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecurringEventId(pub u64);

/// Identifier of either kind of event.
///
/// Renders as `e<n>` for one-off events and `re<n>` for recurring ones, and
/// parses back from the same form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EventId {
    Single(SingleEventId),
    Recurring(RecurringEventId),
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventId::Single(id) => write!(f, "e{}", id.0),
            EventId::Recurring(id) => write!(f, "re{}", id.0),
        }
    }
}

impl FromStr for EventId {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ScheduleError::NotFound(format!("malformed event id '{}'", s));
        if let Some(num) = s.strip_prefix("re") {
            num.parse()
                .map(|n| EventId::Recurring(RecurringEventId(n)))
                .map_err(|_| invalid())
        } else if let Some(num) = s.strip_prefix('e') {
            num.parse()
                .map(|n| EventId::Single(SingleEventId(n)))
                .map_err(|_| invalid())
        } else {
            Err(invalid())
        }
    }
}

/// Kinds a one-off event can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SingleKind {
    Lesson,
    MovedLesson,
    WorkBreak,
    Vacation,
}

/// Kinds a recurring event can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurringKind {
    Lesson,
    WorkStart,
    WorkEnd,
    Weekend,
    WorkBreak,
}

/// Unified kind carried by an [`Occurrence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Lesson,
    MovedLesson,
    WorkBreak,
    Vacation,
    WorkStart,
    WorkEnd,
    Weekend,
}

impl EventKind {
    pub fn is_lesson(self) -> bool {
        matches!(self, EventKind::Lesson | EventKind::MovedLesson)
    }

    /// Work boundaries are expressed through the work window, not as busy time.
    pub fn is_work_boundary(self) -> bool {
        matches!(self, EventKind::WorkStart | EventKind::WorkEnd)
    }

    pub fn label(self) -> &'static str {
        match self {
            EventKind::Lesson => "lesson",
            EventKind::MovedLesson => "moved lesson",
            EventKind::WorkBreak => "break",
            EventKind::Vacation => "vacation",
            EventKind::WorkStart => "work start",
            EventKind::WorkEnd => "work end",
            EventKind::Weekend => "day off",
        }
    }
}

impl From<SingleKind> for EventKind {
    fn from(kind: SingleKind) -> Self {
        match kind {
            SingleKind::Lesson => EventKind::Lesson,
            SingleKind::MovedLesson => EventKind::MovedLesson,
            SingleKind::WorkBreak => EventKind::WorkBreak,
            SingleKind::Vacation => EventKind::Vacation,
        }
    }
}

impl From<RecurringKind> for EventKind {
    fn from(kind: RecurringKind) -> Self {
        match kind {
            RecurringKind::Lesson => EventKind::Lesson,
            RecurringKind::WorkStart => EventKind::WorkStart,
            RecurringKind::WorkEnd => EventKind::WorkEnd,
            RecurringKind::Weekend => EventKind::Weekend,
            RecurringKind::WorkBreak => EventKind::WorkBreak,
        }
    }
}

/// A one-off event. Cancelled events are kept for audit but never occupy time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleEvent {
    pub id: SingleEventId,
    pub owner: OwnerId,
    pub subject: ParticipantId,
    pub kind: SingleKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub reschedule_of: Option<SingleEventId>,
}

impl SingleEvent {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

/// An arithmetic sequence of occurrences sharing the anchor's weekday and
/// local time-of-day, every `interval_days` days from the anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringEvent {
    pub id: RecurringEventId,
    pub owner: OwnerId,
    pub subject: ParticipantId,
    pub kind: RecurringKind,
    pub anchor_start: DateTime<Utc>,
    pub anchor_end: DateTime<Utc>,
    pub interval_days: u32,
    #[serde(default)]
    pub interval_end: Option<DateTime<Utc>>,
}

/// Suppresses the one occurrence of a recurring event whose window overlaps
/// `[occurrence_start, occurrence_end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub recurring_event_id: RecurringEventId,
    pub occurrence_start: DateTime<Utc>,
    pub occurrence_end: DateTime<Utc>,
}

impl Cancellation {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.occurrence_start < end && start < self.occurrence_end
    }
}

/// A one-off event that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSingleEvent {
    pub owner: OwnerId,
    pub subject: ParticipantId,
    pub kind: SingleKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reschedule_of: Option<SingleEventId>,
}

impl NewSingleEvent {
    pub fn validate(&self) -> Result<()> {
        if self.end <= self.start {
            return Err(ScheduleError::InvalidRange(format!(
                "event end {} is not after start {}",
                self.end, self.start
            )));
        }
        Ok(())
    }
}

/// A recurring event that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecurringEvent {
    pub owner: OwnerId,
    pub subject: ParticipantId,
    pub kind: RecurringKind,
    pub anchor_start: DateTime<Utc>,
    pub anchor_end: DateTime<Utc>,
    pub interval_days: u32,
    pub interval_end: Option<DateTime<Utc>>,
}

impl NewRecurringEvent {
    pub fn validate(&self) -> Result<()> {
        if self.anchor_end <= self.anchor_start {
            return Err(ScheduleError::InvalidRange(format!(
                "anchor end {} is not after anchor start {}",
                self.anchor_end, self.anchor_start
            )));
        }
        if self.interval_days == 0 {
            return Err(ScheduleError::InvalidRange(
                "interval_days must be positive".to_string(),
            ));
        }
        if matches!(self.interval_end, Some(end) if end < self.anchor_start) {
            return Err(ScheduleError::InvalidRange(
                "interval_end precedes the anchor".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where an occurrence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OccurrenceSource {
    Single { id: SingleEventId },
    Recurring { id: RecurringEventId, date: NaiveDate },
}

impl OccurrenceSource {
    pub fn event_id(&self) -> EventId {
        match *self {
            OccurrenceSource::Single { id } => EventId::Single(id),
            OccurrenceSource::Recurring { id, .. } => EventId::Recurring(id),
        }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, OccurrenceSource::Recurring { .. })
    }
}

/// A concrete window during which some event occupies the calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub source: OccurrenceSource,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kind: EventKind,
    pub subject: ParticipantId,
}

impl Occurrence {
    pub fn from_single(event: &SingleEvent) -> Self {
        Occurrence {
            source: OccurrenceSource::Single { id: event.id },
            start: event.start,
            end: event.end,
            kind: event.kind.into(),
            subject: event.subject,
        }
    }

    /// Half-open overlap: touching windows do not overlap.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}
