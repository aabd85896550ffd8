//! Compose a day's effective occupied windows.
//!
//! One-off events and recurring occurrences are merged into a single ordered
//! list. Cancelled one-offs never appear, and a subject on vacation has all of
//! their entries for the day hidden. A vacation blocks only its own subject.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::{debug, instrument};

use crate::calendar::OwnerCalendar;
use crate::config::EngineConfig;
use crate::dst::day_bounds;
use crate::error::Result;
use crate::model::{Occurrence, OwnerId, ParticipantId, SingleKind};
use crate::store::EventStore;

/// The composed view of one local day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayView {
    pub date: NaiveDate,
    /// Effective occurrences ordered by start time.
    pub occurrences: Vec<Occurrence>,
    /// Subjects with an active vacation covering the day.
    pub on_vacation: BTreeSet<ParticipantId>,
}

impl DayView {
    pub fn lessons(&self) -> impl Iterator<Item = &Occurrence> {
        self.occurrences.iter().filter(|o| o.kind.is_lesson())
    }

    pub fn lesson_count(&self) -> usize {
        self.lessons().count()
    }
}

/// Compose local `date` from an already loaded calendar.
pub fn compose_day(calendar: &OwnerCalendar, date: NaiveDate, config: &EngineConfig) -> DayView {
    let (day_start, day_end) = day_bounds(&config.timezone, date);

    let on_vacation: BTreeSet<ParticipantId> = calendar
        .single_events
        .iter()
        .filter(|e| e.kind == SingleKind::Vacation && !e.cancelled)
        .filter(|e| e.overlaps(day_start, day_end))
        .map(|e| e.subject)
        .collect();

    let one_offs = calendar
        .single_events
        .iter()
        .filter(|e| !e.cancelled && e.overlaps(day_start, day_end))
        .map(Occurrence::from_single);

    let recurring = calendar
        .series
        .iter()
        .filter_map(|s| s.occurrence_on(date, config));

    let mut occurrences: Vec<Occurrence> = one_offs
        .chain(recurring)
        .filter(|o| !on_vacation.contains(&o.subject))
        .collect();
    occurrences.sort_by_key(|o| (o.start, o.end, o.source));

    DayView {
        date,
        occurrences,
        on_vacation,
    }
}

/// Load and compose local `date` for `owner`.
#[instrument(skip_all, fields(owner = owner.0, %date))]
pub fn day_view<S: EventStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    owner: OwnerId,
    date: NaiveDate,
) -> Result<DayView> {
    let calendar = OwnerCalendar::for_day(store, owner, date, config)?;
    let view = compose_day(&calendar, date, config);
    debug!(
        occurrences = view.occurrences.len(),
        vacationing = view.on_vacation.len(),
        "composed day"
    );
    Ok(view)
}

/// The ordered occurrences of local `date`, optionally limited to one subject.
pub fn day_schedule<S: EventStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    owner: OwnerId,
    date: NaiveDate,
    subject_filter: Option<ParticipantId>,
) -> Result<Vec<Occurrence>> {
    let view = day_view(store, config, owner, date)?;
    Ok(match subject_filter {
        Some(subject) => view
            .occurrences
            .into_iter()
            .filter(|o| o.subject == subject)
            .collect(),
        None => view.occurrences,
    })
}
