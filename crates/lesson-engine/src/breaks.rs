//! Automatic break placement after long runs of back-to-back lessons.
//!
//! A run is a maximal sequence of lessons where each one starts exactly when
//! the previous one ends. When a run reaches `max_consecutive_lessons`, a
//! short break is placed right after it, unless one is already there or the
//! day closes too soon after the run. Nothing is placed on a day the owner
//! is on vacation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::calendar::OwnerCalendar;
use crate::compositor::compose_day;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::freebusy::work_window;
use crate::model::{
    EventKind, NewRecurringEvent, NewSingleEvent, Occurrence, OccurrenceSource, OwnerId,
    RecurringKind, SingleKind,
};
use crate::store::EventStore;

/// Why no break was placed after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A break already starts where the run ends.
    AlreadyPresent,
    /// Less than one lesson length remains before closing.
    NoRoomBeforeClose,
    /// The break window would overlap something else.
    Occupied,
    /// The owner is on vacation that day.
    OwnerOnVacation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedBreak {
    pub start: DateTime<Utc>,
    pub reason: SkipReason,
}

/// A break to be created.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedBreak {
    /// Every lesson in the run recurs, so the break recurs weekly too.
    Weekly {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_end: Option<DateTime<Utc>>,
    },
    Once {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BreakPlacement {
    pub created: Vec<Occurrence>,
    pub skipped: Vec<SkippedBreak>,
}

/// Split lessons (sorted by start) into maximal zero-gap runs.
fn runs(lessons: &[&Occurrence]) -> Vec<Vec<Occurrence>> {
    let mut runs: Vec<Vec<Occurrence>> = Vec::new();
    for &lesson in lessons {
        if let Some(run) = runs
            .last_mut()
            .filter(|run| run.last().is_some_and(|prev| prev.end == lesson.start))
        {
            run.push(lesson.clone());
        } else {
            runs.push(vec![lesson.clone()]);
        }
    }
    runs
}

/// Decide which breaks local `date` needs, without writing anything.
pub fn plan_breaks(
    calendar: &OwnerCalendar,
    date: NaiveDate,
    config: &EngineConfig,
) -> (Vec<PlannedBreak>, Vec<SkippedBreak>) {
    let view = compose_day(calendar, date, config);
    let window = work_window(calendar, &view, config);
    let lessons: Vec<&Occurrence> = view.lessons().collect();
    let owner_away = view.on_vacation.contains(&calendar.owner.participant());

    let mut planned = Vec::new();
    let mut skipped = Vec::new();

    for run in runs(&lessons) {
        if run.len() < config.max_consecutive_lessons as usize {
            continue;
        }
        let Some(last) = run.last() else { continue };
        let start = last.end;
        let end = start + config.break_duration();

        // Owner breaks are hidden while the owner is away.
        let reason = if owner_away {
            Some(SkipReason::OwnerOnVacation)
        } else if view
            .occurrences
            .iter()
            .any(|o| o.kind == EventKind::WorkBreak && o.start == start)
        {
            Some(SkipReason::AlreadyPresent)
        } else if window.end - start < config.lesson_size() {
            Some(SkipReason::NoRoomBeforeClose)
        } else if view
            .occurrences
            .iter()
            .any(|o| !o.kind.is_work_boundary() && o.overlaps(start, end))
        {
            Some(SkipReason::Occupied)
        } else {
            None
        };

        match reason {
            Some(reason @ (SkipReason::AlreadyPresent | SkipReason::OwnerOnVacation)) => {
                skipped.push(SkippedBreak { start, reason })
            }
            Some(reason) => {
                warn!(
                    %start,
                    run = run.len(),
                    ?reason,
                    "lesson run exceeds the limit but no break can be placed"
                );
                skipped.push(SkippedBreak { start, reason });
            }
            None => planned.push(plan_for_run(calendar, &run, start, end)),
        }
    }

    (planned, skipped)
}

fn plan_for_run(
    calendar: &OwnerCalendar,
    run: &[Occurrence],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> PlannedBreak {
    let series: Option<Vec<_>> = run
        .iter()
        .map(|o| match o.source {
            OccurrenceSource::Recurring { id, .. } => calendar.series(id),
            OccurrenceSource::Single { .. } => None,
        })
        .collect();

    match series {
        Some(series) => PlannedBreak::Weekly {
            start,
            end,
            // The break lives no longer than the earliest-ending lesson series.
            interval_end: series.iter().filter_map(|s| s.event.interval_end).min(),
        },
        None => PlannedBreak::Once { start, end },
    }
}

/// Place the breaks local `date` needs and return what was created.
///
/// This writes to the store. Callers serialize it with other writes for the
/// same owner; [`crate::booking::Booker::place_breaks`] does so.
#[instrument(skip_all, fields(owner = owner.0, %date))]
pub fn place_breaks<S: EventStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    owner: OwnerId,
    date: NaiveDate,
) -> Result<BreakPlacement> {
    let calendar = OwnerCalendar::for_day(store, owner, date, config)?;
    let (planned, skipped) = plan_breaks(&calendar, date, config);

    let subject = owner.participant();
    let mut created = Vec::with_capacity(planned.len());
    for plan in planned {
        let occurrence = match plan {
            PlannedBreak::Weekly {
                start,
                end,
                interval_end,
            } => {
                let series = store.create_recurring_event(NewRecurringEvent {
                    owner,
                    subject,
                    kind: RecurringKind::WorkBreak,
                    anchor_start: start,
                    anchor_end: end,
                    interval_days: 7,
                    interval_end,
                })?;
                Occurrence {
                    source: OccurrenceSource::Recurring {
                        id: series.id,
                        date,
                    },
                    start,
                    end,
                    kind: EventKind::WorkBreak,
                    subject,
                }
            }
            PlannedBreak::Once { start, end } => {
                let event = store.create_single_event(NewSingleEvent {
                    owner,
                    subject,
                    kind: SingleKind::WorkBreak,
                    start,
                    end,
                    reschedule_of: None,
                })?;
                Occurrence::from_single(&event)
            }
        };
        info!(start = %occurrence.start, id = %occurrence.source.event_id(), "placed break");
        created.push(occurrence);
    }

    Ok(BreakPlacement { created, skipped })
}
