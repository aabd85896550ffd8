//! Owner-scoped write operations.
//!
//! Every write takes the owner's lock, re-reads the calendar, re-validates
//! that the requested time is still free, and only then commits. Two callers
//! racing for the same slot therefore get one booking and one
//! [`ScheduleError::SlotUnavailable`]. Reads never take the lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::breaks::{self, BreakPlacement};
use crate::calendar::OwnerCalendar;
use crate::config::EngineConfig;
use crate::dst::{day_bounds, local_date, resolve_local};
use crate::error::{Result, ScheduleError};
use crate::expander;
use crate::freebusy::{self, free_slots_in, next_weekday_after, FreeSlots};
use crate::model::{
    Cancellation, EventKind, NewRecurringEvent, NewSingleEvent, OwnerId, ParticipantId,
    RecurringEvent, RecurringEventId, RecurringKind, SingleEvent, SingleEventId, SingleKind,
};
use crate::store::EventStore;

/// One mutex per owner, created on first use and dropped once no caller
/// holds or waits for it.
#[derive(Debug, Default)]
pub struct OwnerLocks {
    locks: Mutex<HashMap<OwnerId, Arc<Mutex<()>>>>,
}

impl OwnerLocks {
    /// Run `f` while holding `owner`'s lock.
    pub fn with_owner<R>(&self, owner: OwnerId, f: impl FnOnce() -> R) -> R {
        let lock = self.locks.lock().entry(owner).or_default().clone();
        let result = {
            let _guard = lock.lock();
            f()
        };

        let mut locks = self.locks.lock();
        drop(lock);
        // Only the map still refers to it: nobody holds or waits.
        if locks.get(&owner).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&owner);
        }
        result
    }

    /// Number of owners with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

/// A committed write together with the breaks it triggered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Booked<T> {
    pub event: T,
    pub breaks: BreakPlacement,
}

/// Write side of the engine.
#[derive(Debug, Default)]
pub struct Booker<S> {
    store: S,
    locks: OwnerLocks,
}

impl<S: EventStore> Booker<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: OwnerLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Book a one-off lesson starting at `start`.
    ///
    /// The lesson is committed before breaks are placed; a failure while
    /// placing breaks is still returned as an error.
    #[instrument(skip_all, fields(owner = owner.0, subject = subject.0, %start))]
    pub fn book_lesson(
        &self,
        config: &EngineConfig,
        owner: OwnerId,
        subject: ParticipantId,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Booked<SingleEvent>> {
        check_horizon(config, start, now)?;
        let date = local_date(&config.timezone, start);

        self.locks.with_owner(owner, || {
            let calendar = OwnerCalendar::for_day(&self.store, owner, date, config)?;
            ensure_bookable(&free_slots_in(&calendar, date, config, now), config, start)?;

            let event = self.store.create_single_event(NewSingleEvent {
                owner,
                subject,
                kind: SingleKind::Lesson,
                start,
                end: start + config.lesson_size(),
                reschedule_of: None,
            })?;
            info!(id = event.id.0, %start, "booked lesson");

            let breaks = breaks::place_breaks(&self.store, config, owner, date)?;
            Ok(Booked { event, breaks })
        })
    }

    /// Book a weekly lesson on `weekday` at local `time`, starting next week.
    ///
    /// Later weeks inside the booking horizon must not collide with one-off
    /// lessons already booked there.
    #[instrument(skip_all, fields(owner = owner.0, subject = subject.0, ?weekday, %time))]
    pub fn book_weekly_lesson(
        &self,
        config: &EngineConfig,
        owner: OwnerId,
        subject: ParticipantId,
        weekday: Weekday,
        time: NaiveTime,
        now: DateTime<Utc>,
    ) -> Result<Booked<RecurringEvent>> {
        self.locks.with_owner(owner, || {
            let slots = freebusy::free_slots_weekday_ignoring(
                &self.store,
                config,
                owner,
                weekday,
                now,
                None,
            )?;
            let start = local_start(config, slots.date, time)?;
            ensure_bookable(&slots, config, start)?;
            let candidate = RecurringEvent {
                id: RecurringEventId(0),
                owner,
                subject,
                kind: RecurringKind::Lesson,
                anchor_start: start,
                anchor_end: start + config.lesson_size(),
                interval_days: 7,
                interval_end: None,
            };
            ensure_clear_of_one_offs(&self.store, config, &candidate, now)?;

            let event = self.store.create_recurring_event(NewRecurringEvent {
                owner,
                subject,
                kind: RecurringKind::Lesson,
                anchor_start: start,
                anchor_end: start + config.lesson_size(),
                interval_days: 7,
                interval_end: None,
            })?;
            info!(id = event.id.0, %start, "booked weekly lesson");

            let breaks = breaks::place_breaks(&self.store, config, owner, slots.date)?;
            Ok(Booked { event, breaks })
        })
    }

    /// Move a one-off lesson: the original is cancelled and a MOVED_LESSON
    /// pointing back at it is created.
    #[instrument(skip_all, fields(id = id.0, %new_start))]
    pub fn move_lesson(
        &self,
        config: &EngineConfig,
        id: SingleEventId,
        new_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Booked<SingleEvent>> {
        check_horizon(config, new_start, now)?;
        let owner = self.store.single_event(id)?.owner;
        let date = local_date(&config.timezone, new_start);

        self.locks.with_owner(owner, || {
            let original = self.store.single_event(id)?;
            if original.cancelled {
                return Err(ScheduleError::NotFound(format!(
                    "event e{} is cancelled",
                    id.0
                )));
            }
            if !matches!(original.kind, SingleKind::Lesson | SingleKind::MovedLesson) {
                return Err(ScheduleError::InvalidRange(format!(
                    "event e{} is not a lesson",
                    id.0
                )));
            }

            // The lesson must not block its own new time.
            let mut calendar = OwnerCalendar::for_day(&self.store, owner, date, config)?;
            calendar.single_events.retain(|e| e.id != id);
            ensure_bookable(&free_slots_in(&calendar, date, config, now), config, new_start)?;

            self.store.mark_cancelled(id)?;
            let event = self.store.create_single_event(NewSingleEvent {
                owner,
                subject: original.subject,
                kind: SingleKind::MovedLesson,
                start: new_start,
                end: new_start + (original.end - original.start),
                reschedule_of: Some(id),
            })?;
            info!(from = id.0, to = event.id.0, %new_start, "moved lesson");

            let breaks = breaks::place_breaks(&self.store, config, owner, date)?;
            Ok(Booked { event, breaks })
        })
    }

    /// Move a weekly lesson series for good by re-anchoring it on `weekday`
    /// at local `time`, starting next week.
    ///
    /// Cancelled occurrences of the old pattern are forgotten: after the move
    /// every week of the new pattern takes place.
    #[instrument(skip_all, fields(id = id.0, ?weekday, %time))]
    pub fn move_series(
        &self,
        config: &EngineConfig,
        id: RecurringEventId,
        weekday: Weekday,
        time: NaiveTime,
        now: DateTime<Utc>,
    ) -> Result<Booked<RecurringEvent>> {
        let owner = self.store.recurring_event(id)?.owner;

        self.locks.with_owner(owner, || {
            let series = self.store.recurring_event(id)?;
            if series.kind != RecurringKind::Lesson {
                return Err(ScheduleError::InvalidRange(format!(
                    "series re{} is not a lesson",
                    id.0
                )));
            }

            let slots = freebusy::free_slots_weekday_ignoring(
                &self.store,
                config,
                owner,
                weekday,
                now,
                Some(id),
            )?;
            let start = local_start(config, slots.date, time)?;
            if series.interval_end.is_some_and(|end| end < start) {
                return Err(ScheduleError::InvalidRange(format!(
                    "series re{} ends before {}",
                    id.0, start
                )));
            }
            ensure_bookable(&slots, config, start)?;
            let end = start + (series.anchor_end - series.anchor_start);
            let candidate = RecurringEvent {
                anchor_start: start,
                anchor_end: end,
                ..series
            };
            ensure_clear_of_one_offs(&self.store, config, &candidate, now)?;

            let event = self.store.update_recurring_anchor(id, start, end)?;
            info!(id = id.0, %start, "moved lesson series");

            let breaks = breaks::place_breaks(&self.store, config, owner, slots.date)?;
            Ok(Booked { event, breaks })
        })
    }

    /// Cancel a one-off event. The row is kept with `cancelled = true`.
    #[instrument(skip_all, fields(id = id.0))]
    pub fn cancel_lesson(&self, id: SingleEventId) -> Result<SingleEvent> {
        let owner = self.store.single_event(id)?.owner;
        self.locks.with_owner(owner, || {
            if self.store.single_event(id)?.cancelled {
                return Err(ScheduleError::DuplicateCancellation(format!(
                    "event e{} is already cancelled",
                    id.0
                )));
            }
            let event = self.store.mark_cancelled(id)?;
            info!(id = id.0, "cancelled lesson");
            Ok(event)
        })
    }

    /// Cancel the single occurrence of series `id` on local `date`.
    ///
    /// Cancelling an occurrence that is already cancelled is rejected with
    /// [`ScheduleError::DuplicateCancellation`].
    #[instrument(skip_all, fields(id = id.0, %date))]
    pub fn cancel_occurrence(
        &self,
        config: &EngineConfig,
        id: RecurringEventId,
        date: NaiveDate,
    ) -> Result<Cancellation> {
        let owner = self.store.recurring_event(id)?.owner;
        self.locks.with_owner(owner, || {
            let series = self.store.recurring_event(id)?;
            let occurrence = expander::occurrence_on(&series, &[], date, config).ok_or_else(|| {
                ScheduleError::NotFound(format!("series re{} has no occurrence on {}", id.0, date))
            })?;

            let existing = self.store.list_cancellations(&[id])?;
            if existing
                .iter()
                .any(|c| c.overlaps(occurrence.start, occurrence.end))
            {
                return Err(ScheduleError::DuplicateCancellation(format!(
                    "occurrence of re{} on {} is already cancelled",
                    id.0, date
                )));
            }

            let cancellation = self.store.create_cancellation(Cancellation {
                recurring_event_id: id,
                occurrence_start: occurrence.start,
                occurrence_end: occurrence.end,
            })?;
            info!(id = id.0, %date, "cancelled occurrence");
            Ok(cancellation)
        })
    }

    /// Delete a series and all of its cancellations.
    #[instrument(skip_all, fields(id = id.0))]
    pub fn cancel_series(&self, id: RecurringEventId) -> Result<()> {
        let owner = self.store.recurring_event(id)?.owner;
        self.locks.with_owner(owner, || {
            self.store.delete_recurring_event(id)?;
            info!(id = id.0, "deleted series");
            Ok(())
        })
    }

    /// Record a vacation for `subject` covering local days `from..=to`.
    #[instrument(skip_all, fields(owner = owner.0, subject = subject.0, %from, %to))]
    pub fn add_vacation(
        &self,
        config: &EngineConfig,
        owner: OwnerId,
        subject: ParticipantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<SingleEvent> {
        if to < from {
            return Err(ScheduleError::InvalidRange(format!(
                "vacation {}..{} is inverted",
                from, to
            )));
        }
        let (start, _) = day_bounds(&config.timezone, from);
        let (_, end) = day_bounds(&config.timezone, to);

        self.locks.with_owner(owner, || {
            self.store.create_single_event(NewSingleEvent {
                owner,
                subject,
                kind: SingleKind::Vacation,
                start,
                end,
                reschedule_of: None,
            })
        })
    }

    /// Define weekly opening hours for `weekday`, effective from its next
    /// occurrence. Returns the WORK_START and WORK_END series.
    #[instrument(skip_all, fields(owner = owner.0, ?weekday))]
    pub fn set_work_hours(
        &self,
        config: &EngineConfig,
        owner: OwnerId,
        weekday: Weekday,
        open: NaiveTime,
        close: NaiveTime,
        now: DateTime<Utc>,
    ) -> Result<(RecurringEvent, RecurringEvent)> {
        if close <= open {
            return Err(ScheduleError::InvalidRange(format!(
                "work hours {}-{} are empty",
                open, close
            )));
        }
        let date = next_weekday_after(local_date(&config.timezone, now), weekday);
        let (day_start, day_end) = day_bounds(&config.timezone, date);
        let open_at = local_start(config, date, open)?;
        let close_at = local_start(config, date, close)?;

        self.locks.with_owner(owner, || {
            let weekly = |kind, anchor_start, anchor_end| NewRecurringEvent {
                owner,
                subject: owner.participant(),
                kind,
                anchor_start,
                anchor_end,
                interval_days: 7,
                interval_end: None,
            };
            let start = self.store.create_recurring_event(weekly(
                RecurringKind::WorkStart,
                day_start,
                open_at,
            ))?;
            let end = self.store.create_recurring_event(weekly(
                RecurringKind::WorkEnd,
                close_at,
                day_end,
            ))?;
            Ok((start, end))
        })
    }

    /// Mark `weekday` as a weekly day off, effective from its next occurrence.
    #[instrument(skip_all, fields(owner = owner.0, ?weekday))]
    pub fn set_weekend(
        &self,
        config: &EngineConfig,
        owner: OwnerId,
        weekday: Weekday,
        now: DateTime<Utc>,
    ) -> Result<RecurringEvent> {
        let date = next_weekday_after(local_date(&config.timezone, now), weekday);
        let (day_start, day_end) = day_bounds(&config.timezone, date);

        self.locks.with_owner(owner, || {
            self.store.create_recurring_event(NewRecurringEvent {
                owner,
                subject: owner.participant(),
                kind: RecurringKind::Weekend,
                anchor_start: day_start,
                anchor_end: day_end,
                interval_days: 7,
                interval_end: None,
            })
        })
    }

    /// Place any breaks local `date` needs, under the owner's lock.
    pub fn place_breaks(
        &self,
        config: &EngineConfig,
        owner: OwnerId,
        date: NaiveDate,
    ) -> Result<BreakPlacement> {
        self.locks
            .with_owner(owner, || breaks::place_breaks(&self.store, config, owner, date))
    }
}

fn check_horizon(config: &EngineConfig, start: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if start < now + config.lead_time() {
        return Err(ScheduleError::InvalidRange(format!(
            "{} is less than {} minutes from now",
            start, config.lead_time_minutes
        )));
    }
    if start > now + config.booking_horizon() {
        return Err(ScheduleError::InvalidRange(format!(
            "{} is beyond the {}-day booking horizon",
            start, config.booking_horizon_days
        )));
    }
    Ok(())
}

/// Reject a weekly lesson pattern that lands on a one-off lesson booked for a
/// later week inside the booking horizon.
fn ensure_clear_of_one_offs<S: EventStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    candidate: &RecurringEvent,
    now: DateTime<Utc>,
) -> Result<()> {
    let (from, _) = day_bounds(&config.timezone, local_date(&config.timezone, now));
    let one_offs =
        store.list_single_events(candidate.owner, from, now + config.booking_horizon())?;

    for event in one_offs
        .iter()
        .filter(|e| !e.cancelled && EventKind::from(e.kind).is_lesson())
    {
        let date = local_date(&config.timezone, event.start);
        if let Some(occurrence) = expander::occurrence_on(candidate, &[], date, config) {
            if occurrence.overlaps(event.start, event.end) {
                debug!(id = event.id.0, %date, "weekly pattern collides with a one-off lesson");
                return Err(ScheduleError::SlotUnavailable {
                    start: occurrence.start,
                });
            }
        }
    }
    Ok(())
}

/// Distinguish "day full" from "that time is taken".
fn ensure_bookable(slots: &FreeSlots, config: &EngineConfig, start: DateTime<Utc>) -> Result<()> {
    if slots.lessons.len() >= config.max_lessons_per_day as usize {
        return Err(ScheduleError::QuotaExceeded {
            date: slots.date,
            limit: config.max_lessons_per_day,
        });
    }
    if !slots.candidates.contains(&start) {
        return Err(ScheduleError::SlotUnavailable { start });
    }
    Ok(())
}

fn local_start(config: &EngineConfig, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>> {
    resolve_local(&config.timezone, date.and_time(time), config.dst_policy).ok_or_else(|| {
        ScheduleError::InvalidRange(format!("{} {} does not exist locally", date, time))
    })
}
