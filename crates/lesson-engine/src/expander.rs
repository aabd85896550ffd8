//! Recurring-event expansion -- turns a series definition into concrete occurrences.
//!
//! A series repeats every `interval_days` days from its anchor, at the anchor's
//! local time-of-day in the operating timezone. [`occurrence_on`] answers the
//! question for a single date; [`expand_series`] lists a date range, with the
//! date sequence generated by the `rrule` crate and every date then checked
//! through [`occurrence_on`] so both entry points agree.

use chrono::{Duration, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::config::EngineConfig;
use crate::dst::{local_date, resolve_local};
use crate::error::{Result, ScheduleError};
use crate::model::{Cancellation, Occurrence, OccurrenceSource, RecurringEvent};

/// The occurrence of `event` on local `date`, if there is one.
///
/// Returns `None` when the date is before the anchor or past `interval_end`,
/// is not a whole number of intervals away from the anchor, falls into a DST
/// gap skipped by the configured policy, or is suppressed by a cancellation
/// overlapping the occurrence window.
pub fn occurrence_on(
    event: &RecurringEvent,
    cancellations: &[Cancellation],
    date: NaiveDate,
    config: &EngineConfig,
) -> Option<Occurrence> {
    let tz = &config.timezone;
    let anchor_local = event.anchor_start.with_timezone(tz);
    let anchor_date = anchor_local.date_naive();

    if event.interval_days == 0 || date < anchor_date {
        return None;
    }
    if let Some(interval_end) = event.interval_end {
        if date > local_date(tz, interval_end) {
            return None;
        }
    }

    let diff = (date - anchor_date).num_days();
    if diff % event.interval_days as i64 != 0 {
        return None;
    }

    let start = resolve_local(tz, date.and_time(anchor_local.time()), config.dst_policy)?;
    let end = start + (event.anchor_end - event.anchor_start);

    let cancelled = cancellations
        .iter()
        .any(|c| c.recurring_event_id == event.id && c.overlaps(start, end));
    if cancelled {
        return None;
    }

    Some(Occurrence {
        source: OccurrenceSource::Recurring { id: event.id, date },
        start,
        end,
        kind: event.kind.into(),
        subject: event.subject,
    })
}

/// Every occurrence of `event` whose local date lies in `[from, to]`.
///
/// # Errors
/// Returns `ScheduleError::InvalidRange` if `to < from`, if the series has a
/// zero interval, or if the range holds more occurrences than can be expanded
/// in one call.
pub fn expand_series(
    event: &RecurringEvent,
    cancellations: &[Cancellation],
    from: NaiveDate,
    to: NaiveDate,
    config: &EngineConfig,
) -> Result<Vec<Occurrence>> {
    if to < from {
        return Err(ScheduleError::InvalidRange(format!(
            "expansion range {}..{} is inverted",
            from, to
        )));
    }
    if event.interval_days == 0 {
        return Err(ScheduleError::InvalidRange(
            "interval_days must be positive".to_string(),
        ));
    }

    let tz = &config.timezone;
    let interval = event.interval_days as i64;
    let anchor_date = local_date(tz, event.anchor_start);
    let last = match event.interval_end {
        Some(end) => to.min(local_date(tz, end)),
        None => to,
    };

    // First date on the series grid at or after the start of the range.
    let start = from.max(anchor_date);
    let steps = ((start - anchor_date).num_days() + interval - 1) / interval;
    let first = anchor_date + Duration::days(steps * interval);
    if first > last {
        return Ok(Vec::new());
    }

    let count = (last - first).num_days() / interval + 1;
    let count = u16::try_from(count).map_err(|_| {
        ScheduleError::InvalidRange(format!("range {}..{} is too long to expand", from, to))
    })?;

    let dates = series_dates(tz, first, interval, count)?;

    Ok(dates
        .into_iter()
        .filter_map(|date| occurrence_on(event, cancellations, date, config))
        .collect())
}

/// Generate `count` local dates spaced `interval` days apart starting at `first`.
fn series_dates(tz: &Tz, first: NaiveDate, interval: i64, count: u16) -> Result<Vec<NaiveDate>> {
    // Anchor at local noon, which no DST transition touches, so no date is dropped.
    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
    let dtstart_ical = first.and_time(noon).format("%Y%m%dT%H%M%S");

    let rrule_text = format!(
        "DTSTART;TZID={}:{}\nRRULE:FREQ=DAILY;INTERVAL={};COUNT={}",
        tz.name(),
        dtstart_ical,
        interval,
        count
    );

    let rrule_set: RRuleSet = rrule_text
        .parse()
        .map_err(|e| ScheduleError::InvalidRange(format!("cannot expand series: {}", e)))?;

    Ok(rrule_set
        .all(count)
        .dates
        .into_iter()
        .map(|dt| dt.date_naive())
        .collect())
}
