//! Weekly overlap audit.
//!
//! Every recurring series and every upcoming one-off event is placed into a
//! bucket per local weekday. Each bucket is swept in start order to find
//! time-of-day overlaps, and each candidate pair is then confirmed against the
//! real calendar: one-offs must share a date, a series must actually occur on a
//! one-off's date, and two series must share at least one date.
//!
//! Adjacent events (where one ends exactly when another starts) are NOT conflicts.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::calendar::{OwnerCalendar, Series};
use crate::config::EngineConfig;
use crate::dst::{day_bounds, local_date, local_time};
use crate::error::Result;
use crate::freebusy::minute_of_day;
use crate::model::{EventId, EventKind, OwnerId, ParticipantId, SingleEvent, SingleKind};
use crate::store::EventStore;

/// What a lesson collides with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    DoubleBooked,
    LessonDuringBreak,
    LessonOnDayOff,
    LessonBeforeOpen,
    LessonAfterClose,
}

impl Violation {
    pub fn describe(self) -> &'static str {
        match self {
            Violation::DoubleBooked => "double-booked",
            Violation::LessonDuringBreak => "lesson during break",
            Violation::LessonOnDayOff => "lesson on day off",
            Violation::LessonBeforeOpen => "lesson before open",
            Violation::LessonAfterClose => "lesson after close",
        }
    }
}

/// One side of a detected overlap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlapEntry {
    pub id: EventId,
    pub kind: EventKind,
    pub subject: ParticipantId,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// An unordered pair of colliding events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlap {
    pub violation: Violation,
    /// The lesson side. For double bookings, the entry with the smaller id.
    pub lesson: OverlapEntry,
    pub other: OverlapEntry,
    pub weekday: Weekday,
    /// First date on which the two actually collide.
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy)]
enum Source<'a> {
    Single(&'a SingleEvent),
    Recurring(&'a Series),
}

/// A bucketed event descriptor in local minutes-of-day.
#[derive(Debug, Clone)]
struct Entry<'a> {
    source: Source<'a>,
    start_min: i64,
    end_min: i64,
}

impl Entry<'_> {
    fn id(&self) -> EventId {
        match self.source {
            Source::Single(e) => EventId::Single(e.id),
            Source::Recurring(s) => EventId::Recurring(s.event.id),
        }
    }

    fn kind(&self) -> EventKind {
        match self.source {
            Source::Single(e) => e.kind.into(),
            Source::Recurring(s) => s.event.kind.into(),
        }
    }

    fn describe(&self, config: &EngineConfig) -> OverlapEntry {
        let tz = &config.timezone;
        let (id, subject, start, end) = match self.source {
            Source::Single(e) => (EventId::Single(e.id), e.subject, e.start, e.end),
            Source::Recurring(s) => (
                EventId::Recurring(s.event.id),
                s.event.subject,
                s.event.anchor_start,
                s.event.anchor_end,
            ),
        };
        OverlapEntry {
            id,
            kind: self.kind(),
            subject,
            start: local_time(tz, start),
            end: local_time(tz, end),
        }
    }
}

fn span(tz: &chrono_tz::Tz, start: DateTime<Utc>, end: DateTime<Utc>) -> (i64, i64) {
    let start_min = minute_of_day(local_time(tz, start));
    (start_min, start_min + (end - start).num_minutes())
}

/// Put every series and one-off event into its weekday bucket.
fn bucket<'a>(
    calendar: &'a OwnerCalendar,
    config: &EngineConfig,
) -> BTreeMap<u32, Vec<Entry<'a>>> {
    let tz = &config.timezone;
    let mut buckets: BTreeMap<u32, Vec<Entry<'a>>> = BTreeMap::new();

    for series in &calendar.series {
        let anchor_weekday = local_date(tz, series.event.anchor_start).weekday();
        let (start_min, end_min) = span(tz, series.event.anchor_start, series.event.anchor_end);
        // 7 is prime: any other interval eventually visits every weekday.
        let weekdays: Vec<u32> = if series.event.interval_days % 7 == 0 {
            vec![anchor_weekday.num_days_from_monday()]
        } else {
            (0..7).collect()
        };
        for day in weekdays {
            buckets.entry(day).or_default().push(Entry {
                source: Source::Recurring(series),
                start_min,
                end_min,
            });
        }
    }

    for event in &calendar.single_events {
        if event.cancelled || event.kind == SingleKind::Vacation {
            continue;
        }
        let (start_min, end_min) = span(tz, event.start, event.end);
        buckets
            .entry(local_date(tz, event.start).weekday().num_days_from_monday())
            .or_default()
            .push(Entry {
                source: Source::Single(event),
                start_min,
                end_min,
            });
    }

    buckets
}

/// Map a pair of kinds to a violation. At least one side must be a lesson;
/// the returned flag is true when `a` is the lesson side.
fn classify(a: EventKind, b: EventKind) -> Option<(Violation, bool)> {
    let against = |other: EventKind| match other {
        EventKind::Lesson | EventKind::MovedLesson => Some(Violation::DoubleBooked),
        EventKind::WorkBreak => Some(Violation::LessonDuringBreak),
        EventKind::Weekend => Some(Violation::LessonOnDayOff),
        EventKind::WorkStart => Some(Violation::LessonBeforeOpen),
        EventKind::WorkEnd => Some(Violation::LessonAfterClose),
        EventKind::Vacation => None,
    };
    if a.is_lesson() {
        against(b).map(|v| (v, true))
    } else if b.is_lesson() {
        against(a).map(|v| (v, false))
    } else {
        None
    }
}

/// The date on which two bucketed entries really collide, if any.
fn collision_date(a: &Entry<'_>, b: &Entry<'_>, config: &EngineConfig) -> Option<NaiveDate> {
    let tz = &config.timezone;
    match (a.source, b.source) {
        (Source::Single(x), Source::Single(y)) => {
            let date = local_date(tz, x.start);
            (date == local_date(tz, y.start) && x.overlaps(y.start, y.end)).then_some(date)
        }
        (Source::Single(e), Source::Recurring(s)) | (Source::Recurring(s), Source::Single(e)) => {
            // A cancelled occurrence means the one-off is its intended replacement.
            let date = local_date(tz, e.start);
            s.occurrence_on(date, config)
                .filter(|o| o.overlaps(e.start, e.end))
                .map(|_| date)
        }
        (Source::Recurring(x), Source::Recurring(y)) => shared_date(x, y, config),
    }
}

/// First date on which both series have an overlapping, uncancelled occurrence.
fn shared_date(a: &Series, b: &Series, config: &EngineConfig) -> Option<NaiveDate> {
    let tz = &config.timezone;
    let p = a.event.interval_days as i64;
    let q = b.event.interval_days as i64;
    if p == 0 || q == 0 {
        return None;
    }

    let a0 = local_date(tz, a.event.anchor_start);
    let b0 = local_date(tz, b.event.anchor_start);
    let limit = match (a.event.interval_end, b.event.interval_end) {
        (Some(x), Some(y)) => Some(local_date(tz, x.min(y))),
        (Some(x), None) | (None, Some(x)) => Some(local_date(tz, x)),
        (None, None) => None,
    };

    let start = a0.max(b0);
    let mut date = a0 + Duration::days(((start - a0).num_days() + p - 1) / p * p);

    // The grids meet once per lcm(p, q); each cancellation can remove at most
    // one meeting, so this many steps finds a witness if one exists.
    let period = lcm(p, q) / p;
    let steps = period * (a.cancellations.len() + b.cancellations.len() + 1) as i64;

    for _ in 0..steps {
        if limit.is_some_and(|l| date > l) {
            return None;
        }
        if (date - b0).num_days() % q == 0 {
            if let (Some(x), Some(y)) =
                (a.occurrence_on(date, config), b.occurrence_on(date, config))
            {
                if x.overlaps(y.start, y.end) {
                    return Some(date);
                }
            }
        }
        date += Duration::days(p);
    }
    None
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: i64, b: i64) -> i64 {
    a / gcd(a, b) * b
}

/// Find and classify every colliding pair in an already loaded calendar.
pub fn find_overlaps_in(calendar: &OwnerCalendar, config: &EngineConfig) -> Vec<Overlap> {
    let mut found: BTreeMap<(EventId, EventId), Overlap> = BTreeMap::new();

    for mut entries in bucket(calendar, config).into_values() {
        entries.sort_by_key(|e| (e.start_min, e.end_min));

        let mut active: Vec<&Entry<'_>> = Vec::new();
        for entry in &entries {
            active.retain(|a| a.end_min > entry.start_min);

            for other in &active {
                let (a_id, b_id) = (other.id(), entry.id());
                if a_id == b_id {
                    continue;
                }
                let key = (a_id.min(b_id), a_id.max(b_id));
                if found.contains_key(&key) {
                    continue;
                }
                let Some((violation, other_is_lesson)) = classify(other.kind(), entry.kind())
                else {
                    continue;
                };
                let Some(date) = collision_date(other, entry, config) else {
                    continue;
                };

                let (lesson, rest) = match (violation, other_is_lesson) {
                    (Violation::DoubleBooked, _) if b_id < a_id => (entry, *other),
                    (_, true) => (*other, entry),
                    (_, false) => (entry, *other),
                };
                found.insert(
                    key,
                    Overlap {
                        violation,
                        lesson: lesson.describe(config),
                        other: rest.describe(config),
                        weekday: date.weekday(),
                        date,
                    },
                );
            }

            active.push(entry);
        }
    }

    found.into_values().collect()
}

/// Audit `owner`'s calendar for collisions.
///
/// One-off events are considered from the start of today (in the operating
/// timezone) through the booking horizon. The result holds each unordered
/// pair once, ordered by the pair's event ids.
#[instrument(skip_all, fields(owner = owner.0))]
pub fn find_overlaps<S: EventStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    owner: OwnerId,
    now: DateTime<Utc>,
) -> Result<Vec<Overlap>> {
    let (from, _) = day_bounds(&config.timezone, local_date(&config.timezone, now));
    let calendar = OwnerCalendar::load(store, owner, from, from + config.booking_horizon())?;
    let overlaps = find_overlaps_in(&calendar, config);
    debug!(overlaps = overlaps.len(), "overlap audit finished");
    Ok(overlaps)
}

/// Render overlaps as text, one line per violation.
pub fn render_overlaps(overlaps: &[Overlap]) -> String {
    let mut out = String::new();
    for o in overlaps {
        let _ = writeln!(
            out,
            "{} {}: {} {} {}-{} (participant {}) overlaps {} {} {}-{} (participant {}), first on {}",
            o.weekday,
            o.violation.describe(),
            o.lesson.kind.label(),
            o.lesson.id,
            o.lesson.start.format("%H:%M"),
            o.lesson.end.format("%H:%M"),
            o.lesson.subject.0,
            o.other.kind.label(),
            o.other.id,
            o.other.start.format("%H:%M"),
            o.other.end.format("%H:%M"),
            o.other.subject.0,
            o.date,
        );
    }
    out
}
