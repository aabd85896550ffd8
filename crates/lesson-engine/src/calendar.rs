//! An owner's event set as read from the store for one computation.

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::EngineConfig;
use crate::dst::day_bounds;
use crate::error::Result;
use crate::expander;
use crate::model::{
    Cancellation, Occurrence, OwnerId, RecurringEvent, RecurringEventId, SingleEvent,
};
use crate::store::EventStore;

/// A recurring event together with its cancellations.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub event: RecurringEvent,
    pub cancellations: Vec<Cancellation>,
}

impl Series {
    pub fn occurrence_on(&self, date: NaiveDate, config: &EngineConfig) -> Option<Occurrence> {
        expander::occurrence_on(&self.event, &self.cancellations, date, config)
    }

    /// The occurrence the series would have on `date` if nothing were cancelled.
    pub fn scheduled_on(&self, date: NaiveDate, config: &EngineConfig) -> Option<Occurrence> {
        expander::occurrence_on(&self.event, &[], date, config)
    }
}

/// Everything an owner has scheduled: one-off events overlapping the loaded
/// range, and every recurring series with its cancellations.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerCalendar {
    pub owner: OwnerId,
    pub single_events: Vec<SingleEvent>,
    pub series: Vec<Series>,
}

impl OwnerCalendar {
    pub fn load<S: EventStore + ?Sized>(
        store: &S,
        owner: OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Self> {
        let single_events = store.list_single_events(owner, from, to)?;
        let recurring = store.list_recurring_events(owner)?;

        let ids: Vec<RecurringEventId> = recurring.iter().map(|e| e.id).collect();
        let cancellations = store.list_cancellations(&ids)?;

        let series = recurring
            .into_iter()
            .map(|event| Series {
                cancellations: cancellations
                    .iter()
                    .filter(|c| c.recurring_event_id == event.id)
                    .cloned()
                    .collect(),
                event,
            })
            .collect();

        Ok(Self {
            owner,
            single_events,
            series,
        })
    }

    /// Load what is needed to compose local `date`.
    pub fn for_day<S: EventStore + ?Sized>(
        store: &S,
        owner: OwnerId,
        date: NaiveDate,
        config: &EngineConfig,
    ) -> Result<Self> {
        let (from, to) = day_bounds(&config.timezone, date);
        Self::load(store, owner, from, to)
    }

    pub fn series(&self, id: RecurringEventId) -> Option<&Series> {
        self.series.iter().find(|s| s.event.id == id)
    }
}
