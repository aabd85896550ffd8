//! Tests for recurring-event expansion.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use lesson_engine::model::{
    Cancellation, OccurrenceSource, OwnerId, ParticipantId, RecurringEvent, RecurringEventId,
    RecurringKind,
};
use lesson_engine::{expand_series, occurrence_on, EngineConfig, EventKind, ScheduleError};

fn at(month: u32, day: u32, hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, month, day, hour, min, 0).unwrap()
}

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, month, day).unwrap()
}

/// Weekly lesson anchored Monday 2026-10-19 10:00-11:00 UTC.
fn monday_lesson(interval_days: u32) -> RecurringEvent {
    RecurringEvent {
        id: RecurringEventId(1),
        owner: OwnerId(1),
        subject: ParticipantId(7),
        kind: RecurringKind::Lesson,
        anchor_start: at(10, 19, 10, 0),
        anchor_end: at(10, 19, 11, 0),
        interval_days,
        interval_end: None,
    }
}

#[test]
fn weekly_lesson_occurs_next_monday_not_tuesday() {
    let config = EngineConfig::default();
    let series = monday_lesson(7);

    let monday = occurrence_on(&series, &[], date(10, 26), &config).expect("next Monday");
    assert_eq!(monday.start, at(10, 26, 10, 0));
    assert_eq!(monday.end, at(10, 26, 11, 0));
    assert_eq!(monday.kind, EventKind::Lesson);
    assert_eq!(
        monday.source,
        OccurrenceSource::Recurring {
            id: RecurringEventId(1),
            date: date(10, 26)
        }
    );

    assert!(occurrence_on(&series, &[], date(10, 27), &config).is_none());
}

#[test]
fn no_occurrence_before_anchor() {
    let config = EngineConfig::default();
    assert!(occurrence_on(&monday_lesson(7), &[], date(10, 12), &config).is_none());
}

#[test]
fn interval_end_bounds_the_series() {
    let config = EngineConfig::default();
    let mut series = monday_lesson(7);
    series.interval_end = Some(at(11, 2, 23, 0));

    assert!(occurrence_on(&series, &[], date(11, 2), &config).is_some());
    assert!(occurrence_on(&series, &[], date(11, 9), &config).is_none());
}

#[test]
fn biweekly_series_skips_alternate_weeks() {
    let config = EngineConfig::default();
    let series = monday_lesson(14);

    assert!(occurrence_on(&series, &[], date(10, 19), &config).is_some());
    assert!(occurrence_on(&series, &[], date(10, 26), &config).is_none());
    assert!(occurrence_on(&series, &[], date(11, 2), &config).is_some());
}

#[test]
fn cancellation_suppresses_only_its_occurrence() {
    let config = EngineConfig::default();
    let series = monday_lesson(7);
    let cancellations = vec![Cancellation {
        recurring_event_id: RecurringEventId(1),
        occurrence_start: at(10, 26, 10, 0),
        occurrence_end: at(10, 26, 11, 0),
    }];

    assert!(occurrence_on(&series, &cancellations, date(10, 26), &config).is_none());
    assert!(occurrence_on(&series, &cancellations, date(11, 2), &config).is_some());
}

#[test]
fn cancellation_for_another_series_is_ignored() {
    let config = EngineConfig::default();
    let cancellations = vec![Cancellation {
        recurring_event_id: RecurringEventId(99),
        occurrence_start: at(10, 26, 10, 0),
        occurrence_end: at(10, 26, 11, 0),
    }];

    assert!(occurrence_on(&monday_lesson(7), &cancellations, date(10, 26), &config).is_some());
}

#[test]
fn local_time_is_kept_across_dst_change() {
    // Berlin leaves summer time on 2026-10-25: 10:00 local is 08:00 UTC before
    // and 09:00 UTC after.
    let config = EngineConfig {
        timezone: chrono_tz::Europe::Berlin,
        ..EngineConfig::default()
    };
    let mut series = monday_lesson(7);
    series.anchor_start = at(10, 19, 8, 0);
    series.anchor_end = at(10, 19, 9, 0);

    let after = occurrence_on(&series, &[], date(10, 26), &config).unwrap();
    assert_eq!(after.start, at(10, 26, 9, 0));
    assert_eq!(after.end, at(10, 26, 10, 0));
}

#[test]
fn expand_series_lists_range() {
    let config = EngineConfig::default();
    let series = monday_lesson(7);
    let cancellations = vec![Cancellation {
        recurring_event_id: RecurringEventId(1),
        occurrence_start: at(11, 2, 10, 0),
        occurrence_end: at(11, 2, 11, 0),
    }];

    let occurrences =
        expand_series(&series, &cancellations, date(10, 1), date(11, 16), &config).unwrap();
    let starts: Vec<_> = occurrences.iter().map(|o| o.start).collect();

    assert_eq!(
        starts,
        vec![
            at(10, 19, 10, 0),
            at(10, 26, 10, 0),
            at(11, 9, 10, 0),
            at(11, 16, 10, 0),
        ]
    );
}

#[test]
fn expand_series_starts_mid_sequence() {
    let config = EngineConfig::default();
    let occurrences =
        expand_series(&monday_lesson(14), &[], date(10, 20), date(11, 30), &config).unwrap();
    let dates: Vec<_> = occurrences
        .iter()
        .map(|o| o.start.date_naive())
        .collect();
    assert_eq!(dates, vec![date(11, 2), date(11, 16), date(11, 30)]);
}

#[test]
fn expand_series_empty_before_anchor() {
    let config = EngineConfig::default();
    let occurrences =
        expand_series(&monday_lesson(7), &[], date(9, 1), date(10, 18), &config).unwrap();
    assert!(occurrences.is_empty());
}

#[test]
fn expand_series_rejects_inverted_range() {
    let config = EngineConfig::default();
    let err = expand_series(&monday_lesson(7), &[], date(11, 1), date(10, 1), &config).unwrap_err();
    assert!(matches!(err, ScheduleError::InvalidRange(_)));
}
