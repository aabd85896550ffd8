//! Persistence boundary.
//!
//! [`EventStore`] is the collaborator the engine reads from and writes to. A
//! database-backed implementation lives with the calling service; this crate
//! ships [`InMemoryStore`] for tests, the CLI and embedding callers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};
use crate::model::{
    Cancellation, NewRecurringEvent, NewSingleEvent, OwnerId, RecurringEvent, RecurringEventId,
    SingleEvent, SingleEventId,
};

/// Owner-scoped event storage. Every write is expected to be transactional.
pub trait EventStore {
    /// One-off events of `owner` overlapping `[from, to)`, cancelled ones included.
    fn list_single_events(
        &self,
        owner: OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SingleEvent>>;

    fn list_recurring_events(&self, owner: OwnerId) -> Result<Vec<RecurringEvent>>;

    fn list_cancellations(&self, ids: &[RecurringEventId]) -> Result<Vec<Cancellation>>;

    fn single_event(&self, id: SingleEventId) -> Result<SingleEvent>;

    fn recurring_event(&self, id: RecurringEventId) -> Result<RecurringEvent>;

    fn create_single_event(&self, event: NewSingleEvent) -> Result<SingleEvent>;

    fn create_recurring_event(&self, event: NewRecurringEvent) -> Result<RecurringEvent>;

    fn create_cancellation(&self, cancellation: Cancellation) -> Result<Cancellation>;

    /// Flag a one-off event as cancelled. The row is retained.
    fn mark_cancelled(&self, id: SingleEventId) -> Result<SingleEvent>;

    /// Re-anchor a series. Its cancellations name starts of the old anchor
    /// and are dropped.
    fn update_recurring_anchor(
        &self,
        id: RecurringEventId,
        anchor_start: DateTime<Utc>,
        anchor_end: DateTime<Utc>,
    ) -> Result<RecurringEvent>;

    /// Delete a series together with its cancellations.
    fn delete_recurring_event(&self, id: RecurringEventId) -> Result<()>;
}

/// Serializable dump of a store's contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarSnapshot {
    #[serde(default)]
    pub single_events: Vec<SingleEvent>,
    #[serde(default)]
    pub recurring_events: Vec<RecurringEvent>,
    #[serde(default)]
    pub cancellations: Vec<Cancellation>,
}

#[derive(Debug, Default)]
struct Tables {
    single: BTreeMap<SingleEventId, SingleEvent>,
    recurring: BTreeMap<RecurringEventId, RecurringEvent>,
    cancellations: Vec<Cancellation>,
    next_id: u64,
}

impl Tables {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Thread-safe in-memory [`EventStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot, keeping its ids. New ids continue after the largest one.
    pub fn from_snapshot(snapshot: CalendarSnapshot) -> Result<Self> {
        let mut tables = Tables::default();
        for event in snapshot.single_events {
            if event.end <= event.start {
                return Err(ScheduleError::InvalidRange(format!(
                    "snapshot event e{} ends before it starts",
                    event.id.0
                )));
            }
            tables.next_id = tables.next_id.max(event.id.0);
            tables.single.insert(event.id, event);
        }
        for event in snapshot.recurring_events {
            if event.interval_days == 0 || event.anchor_end <= event.anchor_start {
                return Err(ScheduleError::InvalidRange(format!(
                    "snapshot series re{} has an invalid anchor or interval",
                    event.id.0
                )));
            }
            tables.next_id = tables.next_id.max(event.id.0);
            tables.recurring.insert(event.id, event);
        }
        for cancellation in snapshot.cancellations {
            if !tables.recurring.contains_key(&cancellation.recurring_event_id) {
                return Err(ScheduleError::NotFound(format!(
                    "cancellation refers to unknown series re{}",
                    cancellation.recurring_event_id.0
                )));
            }
            tables.cancellations.push(cancellation);
        }
        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    pub fn snapshot(&self) -> CalendarSnapshot {
        let tables = self.tables.read();
        CalendarSnapshot {
            single_events: tables.single.values().cloned().collect(),
            recurring_events: tables.recurring.values().cloned().collect(),
            cancellations: tables.cancellations.clone(),
        }
    }
}

impl EventStore for InMemoryStore {
    fn list_single_events(
        &self,
        owner: OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SingleEvent>> {
        let tables = self.tables.read();
        Ok(tables
            .single
            .values()
            .filter(|e| e.owner == owner && e.overlaps(from, to))
            .cloned()
            .collect())
    }

    fn list_recurring_events(&self, owner: OwnerId) -> Result<Vec<RecurringEvent>> {
        let tables = self.tables.read();
        Ok(tables
            .recurring
            .values()
            .filter(|e| e.owner == owner)
            .cloned()
            .collect())
    }

    fn list_cancellations(&self, ids: &[RecurringEventId]) -> Result<Vec<Cancellation>> {
        let tables = self.tables.read();
        Ok(tables
            .cancellations
            .iter()
            .filter(|c| ids.contains(&c.recurring_event_id))
            .cloned()
            .collect())
    }

    fn single_event(&self, id: SingleEventId) -> Result<SingleEvent> {
        self.tables
            .read()
            .single
            .get(&id)
            .cloned()
            .ok_or_else(|| ScheduleError::NotFound(format!("event e{}", id.0)))
    }

    fn recurring_event(&self, id: RecurringEventId) -> Result<RecurringEvent> {
        self.tables
            .read()
            .recurring
            .get(&id)
            .cloned()
            .ok_or_else(|| ScheduleError::NotFound(format!("series re{}", id.0)))
    }

    fn create_single_event(&self, event: NewSingleEvent) -> Result<SingleEvent> {
        event.validate()?;
        let mut tables = self.tables.write();
        let id = SingleEventId(tables.allocate_id());
        let created = SingleEvent {
            id,
            owner: event.owner,
            subject: event.subject,
            kind: event.kind,
            start: event.start,
            end: event.end,
            cancelled: false,
            reschedule_of: event.reschedule_of,
        };
        tables.single.insert(id, created.clone());
        Ok(created)
    }

    fn create_recurring_event(&self, event: NewRecurringEvent) -> Result<RecurringEvent> {
        event.validate()?;
        let mut tables = self.tables.write();
        let id = RecurringEventId(tables.allocate_id());
        let created = RecurringEvent {
            id,
            owner: event.owner,
            subject: event.subject,
            kind: event.kind,
            anchor_start: event.anchor_start,
            anchor_end: event.anchor_end,
            interval_days: event.interval_days,
            interval_end: event.interval_end,
        };
        tables.recurring.insert(id, created.clone());
        Ok(created)
    }

    fn create_cancellation(&self, cancellation: Cancellation) -> Result<Cancellation> {
        if cancellation.occurrence_end <= cancellation.occurrence_start {
            return Err(ScheduleError::InvalidRange(
                "cancellation window is empty".to_string(),
            ));
        }
        let mut tables = self.tables.write();
        if !tables
            .recurring
            .contains_key(&cancellation.recurring_event_id)
        {
            return Err(ScheduleError::NotFound(format!(
                "series re{}",
                cancellation.recurring_event_id.0
            )));
        }
        tables.cancellations.push(cancellation.clone());
        Ok(cancellation)
    }

    fn mark_cancelled(&self, id: SingleEventId) -> Result<SingleEvent> {
        let mut tables = self.tables.write();
        let event = tables
            .single
            .get_mut(&id)
            .ok_or_else(|| ScheduleError::NotFound(format!("event e{}", id.0)))?;
        event.cancelled = true;
        Ok(event.clone())
    }

    fn update_recurring_anchor(
        &self,
        id: RecurringEventId,
        anchor_start: DateTime<Utc>,
        anchor_end: DateTime<Utc>,
    ) -> Result<RecurringEvent> {
        if anchor_end <= anchor_start {
            return Err(ScheduleError::InvalidRange(
                "anchor end is not after anchor start".to_string(),
            ));
        }
        let mut tables = self.tables.write();
        let event = tables
            .recurring
            .get_mut(&id)
            .ok_or_else(|| ScheduleError::NotFound(format!("series re{}", id.0)))?;
        event.anchor_start = anchor_start;
        event.anchor_end = anchor_end;
        let event = event.clone();
        tables.cancellations.retain(|c| c.recurring_event_id != id);
        Ok(event)
    }

    fn delete_recurring_event(&self, id: RecurringEventId) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.recurring.remove(&id).is_none() {
            return Err(ScheduleError::NotFound(format!("series re{}", id.0)));
        }
        tables.cancellations.retain(|c| c.recurring_event_id != id);
        Ok(())
    }
}
