//! Compute bookable lesson start times for a day.
//!
//! The day's occupied windows are merged into non-overlapping busy periods
//! clipped to the work window, then the window is stepped on the slot grid and
//! every start whose full lesson fits between busy periods is a candidate.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::calendar::{OwnerCalendar, Series};
use crate::compositor::{compose_day, DayView};
use crate::config::EngineConfig;
use crate::dst::{day_bounds, local_date, local_time, resolve_local, DstPolicy};
use crate::error::Result;
use crate::model::{
    EventKind, Occurrence, OccurrenceSource, OwnerId, RecurringEventId, RecurringKind,
};
use crate::store::EventStore;

/// Bookable start times for a day, with the lessons already on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeSlots {
    pub date: NaiveDate,
    /// Candidate lesson starts in chronological order.
    pub candidates: Vec<DateTime<Utc>>,
    /// Lesson occurrences of the day, ordered by start.
    pub lessons: Vec<Occurrence>,
}

/// The open part of a day, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Merge overlapping or adjacent busy periods, clipped to the given window.
///
/// Returns a sorted, non-overlapping list of (start, end) intervals.
pub(crate) fn merge_busy_periods<'a>(
    occurrences: impl IntoIterator<Item = &'a Occurrence>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    // Collect occurrences clipped to the window, discarding those entirely outside.
    let mut intervals: Vec<(DateTime<Utc>, DateTime<Utc>)> = occurrences
        .into_iter()
        .filter(|o| o.start < window_end && o.end > window_start)
        .map(|o| (o.start.max(window_start), o.end.min(window_end)))
        .collect();

    if intervals.is_empty() {
        return Vec::new();
    }

    intervals.sort_by_key(|&(start, end)| (start, end));

    let mut merged: Vec<(DateTime<Utc>, DateTime<Utc>)> = Vec::new();
    for (start, end) in intervals {
        if let Some(last) = merged.last_mut() {
            if start <= last.1 {
                last.1 = last.1.max(end);
                continue;
            }
        }
        merged.push((start, end));
    }

    merged
}

/// Resolve the day's work window.
///
/// The opening time is the end of the most specific WORK_START occurrence and
/// the closing time the start of the most specific WORK_END occurrence. A
/// series with a larger interval is more specific (it is an exception to a
/// broader rule); ties go to the later anchor. Missing boundaries fall back
/// to the configured defaults.
pub fn work_window(calendar: &OwnerCalendar, view: &DayView, config: &EngineConfig) -> WorkWindow {
    let start = most_specific(calendar, view, EventKind::WorkStart)
        .map(|o| o.end)
        .unwrap_or_else(|| local_instant(config, view.date, config.default_work_start));
    let end = most_specific(calendar, view, EventKind::WorkEnd)
        .map(|o| o.start)
        .unwrap_or_else(|| local_instant(config, view.date, config.default_work_end));
    WorkWindow { start, end }
}

fn most_specific<'a>(
    calendar: &OwnerCalendar,
    view: &'a DayView,
    kind: EventKind,
) -> Option<&'a Occurrence> {
    view.occurrences
        .iter()
        .filter(|o| o.kind == kind)
        .max_by_key(|o| match o.source {
            OccurrenceSource::Recurring { id, .. } => calendar
                .series(id)
                .map(|s| (s.event.interval_days, s.event.anchor_start, id.0)),
            OccurrenceSource::Single { .. } => None,
        })
}

fn local_instant(config: &EngineConfig, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    resolve_local(&config.timezone, date.and_time(time), DstPolicy::ShiftForward)
        .unwrap_or_else(|| day_bounds(&config.timezone, date).0)
}

/// Free slots of local `date` computed from an already loaded calendar.
pub fn free_slots_in(
    calendar: &OwnerCalendar,
    date: NaiveDate,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> FreeSlots {
    let view = compose_day(calendar, date, config);
    let lessons: Vec<Occurrence> = view.lessons().cloned().collect();

    if view.on_vacation.contains(&calendar.owner.participant()) {
        debug!(%date, "owner is on vacation");
        return FreeSlots {
            date,
            candidates: Vec::new(),
            lessons,
        };
    }
    if lessons.len() >= config.max_lessons_per_day as usize {
        debug!(%date, lessons = lessons.len(), "day is full");
        return FreeSlots {
            date,
            candidates: Vec::new(),
            lessons,
        };
    }

    let window = work_window(calendar, &view, config);
    let slot = config.slot_size();
    let lesson = config.lesson_size();

    // Never offer a start sooner than the lead time; stay on the slot grid.
    let mut cursor = window.start;
    let earliest = now + config.lead_time();
    if earliest > cursor {
        let behind = (earliest - cursor).num_seconds();
        let step = slot.num_seconds();
        cursor += Duration::seconds((behind + step - 1) / step * step);
    }

    let busy = merge_busy_periods(
        view.occurrences.iter().filter(|o| !o.kind.is_work_boundary()),
        window.start,
        window.end,
    );

    let mut candidates = Vec::new();
    while cursor + lesson <= window.end {
        let end = cursor + lesson;
        if !busy.iter().any(|&(s, e)| s < end && cursor < e) {
            candidates.push(cursor);
        }
        cursor += slot;
    }

    FreeSlots {
        date,
        candidates,
        lessons,
    }
}

/// Bookable lesson starts on local `date` and the lessons already booked.
#[instrument(skip_all, fields(owner = owner.0, %date))]
pub fn free_slots<S: EventStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    owner: OwnerId,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<FreeSlots> {
    let calendar = OwnerCalendar::for_day(store, owner, date, config)?;
    let slots = free_slots_in(&calendar, date, config, now);
    debug!(candidates = slots.candidates.len(), "computed free slots");
    Ok(slots)
}

/// The first date strictly after `today` that falls on `weekday`.
pub fn next_weekday_after(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (weekday.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
    let ahead = if ahead == 0 { 7 } else { ahead };
    today + Duration::days(ahead as i64)
}

/// Weekly-booking variant: free slots on the next `weekday`, minus times on
/// the grid of any recurring lesson held on that weekday.
pub fn free_slots_weekday<S: EventStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    owner: OwnerId,
    weekday: Weekday,
    now: DateTime<Utc>,
) -> Result<FreeSlots> {
    free_slots_weekday_ignoring(store, config, owner, weekday, now, None)
}

/// As [`free_slots_weekday`], treating series `ignore` as if it did not exist.
#[instrument(skip_all, fields(owner = owner.0, ?weekday))]
pub(crate) fn free_slots_weekday_ignoring<S: EventStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    owner: OwnerId,
    weekday: Weekday,
    now: DateTime<Utc>,
    ignore: Option<RecurringEventId>,
) -> Result<FreeSlots> {
    let date = next_weekday_after(local_date(&config.timezone, now), weekday);
    let mut calendar = OwnerCalendar::for_day(store, owner, date, config)?;
    if let Some(ignored) = ignore {
        calendar.series.retain(|s| s.event.id != ignored);
    }

    let mut slots = free_slots_in(&calendar, date, config, now);

    let guarded: Vec<i64> = calendar
        .series
        .iter()
        .filter(|s| weekly_lesson_on(s, weekday, date, config))
        .map(|s| minute_of_day(local_time(&config.timezone, s.event.anchor_start)))
        .collect();

    let slot = config.slot_size_minutes as i64;
    let lesson = config.lesson_size_minutes as i64;
    slots.candidates.retain(|&candidate| {
        let t = minute_of_day(local_time(&config.timezone, candidate));
        !guarded.iter().any(|&s| {
            let diff = (t - s).abs();
            diff < lesson && diff % slot == 0
        })
    });

    debug!(%date, candidates = slots.candidates.len(), "computed weekly free slots");
    Ok(slots)
}

/// A recurring lesson on `weekday` that is still running on `date`.
fn weekly_lesson_on(
    series: &Series,
    weekday: Weekday,
    date: NaiveDate,
    config: &EngineConfig,
) -> bool {
    let tz = &config.timezone;
    series.event.kind == RecurringKind::Lesson
        && local_date(tz, series.event.anchor_start).weekday() == weekday
        && series
            .event
            .interval_end
            .is_none_or(|end| local_date(tz, end) >= date)
}

pub(crate) fn minute_of_day(time: NaiveTime) -> i64 {
    (time.hour() * 60 + time.minute()) as i64
}
