//! Tests for free-slot computation.

use chrono::{DateTime, NaiveDate, TimeZone, Utc, Weekday};
use lesson_engine::freebusy::next_weekday_after;
use lesson_engine::model::{
    NewRecurringEvent, NewSingleEvent, RecurringEvent, RecurringKind, SingleEvent, SingleKind,
};
use lesson_engine::{free_slots, free_slots_weekday, EngineConfig, EventStore, InMemoryStore};
use lesson_engine::{OwnerId, ParticipantId};

const OWNER: OwnerId = OwnerId(1);
const STUDENT: ParticipantId = ParticipantId(7);

fn at(month: u32, day: u32, hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, month, day, hour, min, 0).unwrap()
}

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, month, day).unwrap()
}

/// Saturday morning before the Monday under test.
fn now() -> DateTime<Utc> {
    at(10, 17, 8, 0)
}

fn one_off(
    store: &InMemoryStore,
    kind: SingleKind,
    subject: ParticipantId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> SingleEvent {
    store
        .create_single_event(NewSingleEvent {
            owner: OWNER,
            subject,
            kind,
            start,
            end,
            reschedule_of: None,
        })
        .unwrap()
}

fn series(
    store: &InMemoryStore,
    kind: RecurringKind,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval_days: u32,
) -> RecurringEvent {
    store
        .create_recurring_event(NewRecurringEvent {
            owner: OWNER,
            subject: STUDENT,
            kind,
            anchor_start: start,
            anchor_end: end,
            interval_days,
            interval_end: None,
        })
        .unwrap()
}

#[test]
fn empty_day_offers_every_slot_in_default_hours() {
    let store = InMemoryStore::new();
    let slots = free_slots(&store, &EngineConfig::default(), OWNER, date(10, 19), now()).unwrap();

    assert_eq!(slots.date, date(10, 19));
    assert_eq!(slots.candidates.len(), 29);
    assert_eq!(slots.candidates.first(), Some(&at(10, 19, 9, 0)));
    assert_eq!(slots.candidates.last(), Some(&at(10, 19, 16, 0)));
    assert!(slots.lessons.is_empty());
}

#[test]
fn booked_lesson_blocks_overlapping_starts_only() {
    let store = InMemoryStore::new();
    one_off(&store, SingleKind::Lesson, STUDENT, at(10, 19, 10, 0), at(10, 19, 11, 0));

    let slots = free_slots(&store, &EngineConfig::default(), OWNER, date(10, 19), now()).unwrap();

    assert_eq!(slots.candidates.len(), 22);
    assert!(slots.candidates.contains(&at(10, 19, 9, 0)));
    assert!(slots.candidates.contains(&at(10, 19, 11, 0)));
    for blocked in [(9, 15), (9, 45), (10, 0), (10, 45)] {
        assert!(!slots.candidates.contains(&at(10, 19, blocked.0, blocked.1)));
    }
    assert_eq!(slots.lessons.len(), 1);
}

#[test]
fn cancelled_lesson_frees_its_slot() {
    let store = InMemoryStore::new();
    let lesson = one_off(&store, SingleKind::Lesson, STUDENT, at(10, 19, 10, 0), at(10, 19, 11, 0));
    store.mark_cancelled(lesson.id).unwrap();

    let slots = free_slots(&store, &EngineConfig::default(), OWNER, date(10, 19), now()).unwrap();
    assert_eq!(slots.candidates.len(), 29);
    assert!(slots.lessons.is_empty());
}

#[test]
fn lead_time_pushes_first_slot_onto_grid() {
    let store = InMemoryStore::new();
    let slots = free_slots(
        &store,
        &EngineConfig::default(),
        OWNER,
        date(10, 19),
        at(10, 19, 10, 7),
    )
    .unwrap();

    assert_eq!(slots.candidates.first(), Some(&at(10, 19, 12, 15)));
    assert_eq!(slots.candidates.len(), 16);
}

#[test]
fn full_day_offers_nothing() {
    let store = InMemoryStore::new();
    let config = EngineConfig {
        max_lessons_per_day: 2,
        ..EngineConfig::default()
    };
    one_off(&store, SingleKind::Lesson, STUDENT, at(10, 19, 9, 0), at(10, 19, 10, 0));
    one_off(&store, SingleKind::Lesson, ParticipantId(8), at(10, 19, 13, 0), at(10, 19, 14, 0));

    let slots = free_slots(&store, &config, OWNER, date(10, 19), now()).unwrap();
    assert!(slots.candidates.is_empty());
    assert_eq!(slots.lessons.len(), 2);
}

#[test]
fn work_boundaries_narrow_the_window() {
    let store = InMemoryStore::new();
    series(&store, RecurringKind::WorkStart, at(10, 19, 0, 0), at(10, 19, 10, 0), 7);
    series(&store, RecurringKind::WorkEnd, at(10, 19, 15, 0), at(10, 20, 0, 0), 7);

    let slots = free_slots(&store, &EngineConfig::default(), OWNER, date(10, 19), now()).unwrap();
    assert_eq!(slots.candidates.first(), Some(&at(10, 19, 10, 0)));
    assert_eq!(slots.candidates.last(), Some(&at(10, 19, 14, 0)));
    assert_eq!(slots.candidates.len(), 17);

    // Tuesday keeps the defaults.
    let tuesday = free_slots(&store, &EngineConfig::default(), OWNER, date(10, 20), now()).unwrap();
    assert_eq!(tuesday.candidates.len(), 29);
}

#[test]
fn weekly_boundary_beats_daily_boundary() {
    let store = InMemoryStore::new();
    series(&store, RecurringKind::WorkStart, at(10, 1, 0, 0), at(10, 1, 8, 0), 1);
    series(&store, RecurringKind::WorkStart, at(10, 19, 0, 0), at(10, 19, 10, 0), 7);

    let monday = free_slots(&store, &EngineConfig::default(), OWNER, date(10, 19), now()).unwrap();
    assert_eq!(monday.candidates.first(), Some(&at(10, 19, 10, 0)));

    let tuesday = free_slots(&store, &EngineConfig::default(), OWNER, date(10, 20), now()).unwrap();
    assert_eq!(tuesday.candidates.first(), Some(&at(10, 20, 8, 0)));
}

#[test]
fn day_off_blocks_whole_day() {
    let store = InMemoryStore::new();
    series(&store, RecurringKind::Weekend, at(10, 19, 0, 0), at(10, 20, 0, 0), 7);

    let slots = free_slots(&store, &EngineConfig::default(), OWNER, date(10, 26), now()).unwrap();
    assert!(slots.candidates.is_empty());
}

#[test]
fn owner_vacation_closes_the_day() {
    let store = InMemoryStore::new();
    one_off(
        &store,
        SingleKind::Vacation,
        OWNER.participant(),
        at(10, 19, 0, 0),
        at(10, 21, 0, 0),
    );

    let slots = free_slots(&store, &EngineConfig::default(), OWNER, date(10, 20), now()).unwrap();
    assert!(slots.candidates.is_empty());
}

#[test]
fn student_vacation_releases_their_lessons() {
    let store = InMemoryStore::new();
    one_off(&store, SingleKind::Lesson, STUDENT, at(10, 19, 10, 0), at(10, 19, 11, 0));
    one_off(&store, SingleKind::Vacation, STUDENT, at(10, 19, 0, 0), at(10, 20, 0, 0));

    let slots = free_slots(&store, &EngineConfig::default(), OWNER, date(10, 19), now()).unwrap();
    assert_eq!(slots.candidates.len(), 29);
    assert!(slots.lessons.is_empty());
}

#[test]
fn next_weekday_is_strictly_after_today() {
    // 2026-10-17 is a Saturday.
    assert_eq!(next_weekday_after(date(10, 17), Weekday::Mon), date(10, 19));
    assert_eq!(next_weekday_after(date(10, 17), Weekday::Sat), date(10, 24));
    assert_eq!(next_weekday_after(date(10, 17), Weekday::Sun), date(10, 18));
}

#[test]
fn weekday_variant_guards_other_weeks_of_a_series() {
    let store = InMemoryStore::new();
    // Biweekly lesson that does not fall on the coming Monday.
    series(&store, RecurringKind::Lesson, at(10, 26, 10, 0), at(10, 26, 11, 0), 14);

    let single_day =
        free_slots(&store, &EngineConfig::default(), OWNER, date(10, 19), now()).unwrap();
    assert!(single_day.candidates.contains(&at(10, 19, 10, 0)));

    let weekly = free_slots_weekday(&store, &EngineConfig::default(), OWNER, Weekday::Mon, now())
        .unwrap();
    assert_eq!(weekly.date, date(10, 19));
    assert_eq!(weekly.candidates.len(), 22);
    assert!(!weekly.candidates.contains(&at(10, 19, 10, 0)));
    assert!(!weekly.candidates.contains(&at(10, 19, 10, 45)));
    assert!(weekly.candidates.contains(&at(10, 19, 9, 0)));
    assert!(weekly.candidates.contains(&at(10, 19, 11, 0)));
}
