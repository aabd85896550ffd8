//! Tests for automatic break placement.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use lesson_engine::breaks::SkipReason;
use lesson_engine::model::{
    NewRecurringEvent, NewSingleEvent, OccurrenceSource, RecurringEvent, RecurringKind,
    SingleKind,
};
use lesson_engine::{
    day_schedule, place_breaks, EngineConfig, EventKind, EventStore, InMemoryStore, OwnerId,
    ParticipantId,
};

const OWNER: OwnerId = OwnerId(1);

fn at(month: u32, day: u32, hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, month, day, hour, min, 0).unwrap()
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

/// One-off lessons on Monday starting at each of `hours`, one student each.
fn lessons_at(store: &InMemoryStore, hours: &[u32]) {
    for (i, &hour) in hours.iter().enumerate() {
        store
            .create_single_event(NewSingleEvent {
                owner: OWNER,
                subject: ParticipantId(10 + i as u64),
                kind: SingleKind::Lesson,
                start: at(10, 19, hour, 0),
                end: at(10, 19, hour + 1, 0),
                reschedule_of: None,
            })
            .unwrap();
    }
}

fn weekly_lesson(
    store: &InMemoryStore,
    hour: u32,
    interval_end: Option<DateTime<Utc>>,
) -> RecurringEvent {
    store
        .create_recurring_event(NewRecurringEvent {
            owner: OWNER,
            subject: ParticipantId(20 + hour as u64),
            kind: RecurringKind::Lesson,
            anchor_start: at(10, 12, hour, 0),
            anchor_end: at(10, 12, hour + 1, 0),
            interval_days: 7,
            interval_end,
        })
        .unwrap()
}

#[test]
fn three_back_to_back_lessons_get_a_break() {
    let store = InMemoryStore::new();
    lessons_at(&store, &[10, 11, 12]);

    let placement = place_breaks(&store, &EngineConfig::default(), OWNER, monday()).unwrap();
    assert_eq!(placement.created.len(), 1);
    assert!(placement.skipped.is_empty());

    let created = &placement.created[0];
    assert_eq!(created.kind, EventKind::WorkBreak);
    assert_eq!(created.start, at(10, 19, 13, 0));
    assert_eq!(created.end, at(10, 19, 13, 15));
    assert_eq!(created.subject, OWNER.participant());
    assert!(matches!(created.source, OccurrenceSource::Single { .. }));

    let schedule = day_schedule(&store, &EngineConfig::default(), OWNER, monday(), None).unwrap();
    assert_eq!(schedule.len(), 4);
}

#[test]
fn placing_twice_creates_nothing_new() {
    let store = InMemoryStore::new();
    lessons_at(&store, &[10, 11, 12]);
    let config = EngineConfig::default();

    place_breaks(&store, &config, OWNER, monday()).unwrap();
    let again = place_breaks(&store, &config, OWNER, monday()).unwrap();

    assert!(again.created.is_empty());
    assert_eq!(again.skipped.len(), 1);
    assert_eq!(again.skipped[0].reason, SkipReason::AlreadyPresent);
    assert_eq!(again.skipped[0].start, at(10, 19, 13, 0));
}

#[test]
fn short_or_gapped_runs_need_no_break() {
    let store = InMemoryStore::new();
    lessons_at(&store, &[9, 10, 12, 13]);

    let placement = place_breaks(&store, &EngineConfig::default(), OWNER, monday()).unwrap();
    assert!(placement.created.is_empty());
    assert!(placement.skipped.is_empty());
}

#[test]
fn long_run_gets_one_break_at_its_end() {
    let store = InMemoryStore::new();
    lessons_at(&store, &[9, 10, 11, 12]);

    let placement = place_breaks(&store, &EngineConfig::default(), OWNER, monday()).unwrap();
    assert_eq!(placement.created.len(), 1);
    assert_eq!(placement.created[0].start, at(10, 19, 13, 0));
}

#[test]
fn run_ending_at_close_is_skipped() {
    let store = InMemoryStore::new();
    lessons_at(&store, &[14, 15, 16]);

    let placement = place_breaks(&store, &EngineConfig::default(), OWNER, monday()).unwrap();
    assert!(placement.created.is_empty());
    assert_eq!(placement.skipped.len(), 1);
    assert_eq!(placement.skipped[0].reason, SkipReason::NoRoomBeforeClose);
}

#[test]
fn occupied_break_window_is_skipped() {
    let store = InMemoryStore::new();
    lessons_at(&store, &[10, 11, 12]);
    store
        .create_single_event(NewSingleEvent {
            owner: OWNER,
            subject: OWNER.participant(),
            kind: SingleKind::WorkBreak,
            start: at(10, 19, 13, 5),
            end: at(10, 19, 13, 20),
            reschedule_of: None,
        })
        .unwrap();

    let placement = place_breaks(&store, &EngineConfig::default(), OWNER, monday()).unwrap();
    assert!(placement.created.is_empty());
    assert_eq!(placement.skipped[0].reason, SkipReason::Occupied);
}

#[test]
fn run_of_weekly_lessons_gets_a_weekly_break() {
    let store = InMemoryStore::new();
    let ends_early = weekly_lesson(&store, 10, Some(at(12, 1, 0, 0)));
    weekly_lesson(&store, 11, None);
    weekly_lesson(&store, 12, None);

    let placement = place_breaks(&store, &EngineConfig::default(), OWNER, monday()).unwrap();
    assert_eq!(placement.created.len(), 1);
    let OccurrenceSource::Recurring { id, .. } = placement.created[0].source else {
        panic!("expected a recurring break, got {:?}", placement.created[0].source);
    };

    let pause = store.recurring_event(id).unwrap();
    assert_eq!(pause.kind, RecurringKind::WorkBreak);
    assert_eq!(pause.interval_days, 7);
    assert_eq!(pause.anchor_start, at(10, 19, 13, 0));
    assert_eq!(pause.interval_end, ends_early.interval_end);

    // The break recurs the following week without another placement.
    let next = NaiveDate::from_ymd_opt(2026, 10, 26).unwrap();
    let schedule = day_schedule(&store, &EngineConfig::default(), OWNER, next, None).unwrap();
    assert!(schedule
        .iter()
        .any(|o| o.kind == EventKind::WorkBreak && o.start == at(10, 26, 13, 0)));
}

#[test]
fn mixed_run_gets_a_one_off_break() {
    let store = InMemoryStore::new();
    weekly_lesson(&store, 10, None);
    weekly_lesson(&store, 11, None);
    lessons_at(&store, &[12]);

    let placement = place_breaks(&store, &EngineConfig::default(), OWNER, monday()).unwrap();
    assert_eq!(placement.created.len(), 1);
    assert!(matches!(
        placement.created[0].source,
        OccurrenceSource::Single { .. }
    ));
}

#[test]
fn owner_vacation_places_no_break_on_repeated_calls() {
    let store = InMemoryStore::new();
    lessons_at(&store, &[10, 11, 12]);
    store
        .create_single_event(NewSingleEvent {
            owner: OWNER,
            subject: OWNER.participant(),
            kind: SingleKind::Vacation,
            start: at(10, 19, 0, 0),
            end: at(10, 20, 0, 0),
            reschedule_of: None,
        })
        .unwrap();
    let config = EngineConfig::default();

    for _ in 0..2 {
        let placement = place_breaks(&store, &config, OWNER, monday()).unwrap();
        assert!(placement.created.is_empty());
        assert_eq!(placement.skipped.len(), 1);
        assert_eq!(placement.skipped[0].reason, SkipReason::OwnerOnVacation);
        assert_eq!(placement.skipped[0].start, at(10, 19, 13, 0));
    }

    let breaks = store
        .list_single_events(OWNER, at(10, 19, 0, 0), at(10, 20, 0, 0))
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == SingleKind::WorkBreak)
        .count();
    assert_eq!(breaks, 0);
}
