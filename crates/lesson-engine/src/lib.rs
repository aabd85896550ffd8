//! # lesson-engine
//!
//! Calendar engine for booking lessons between a teacher ("owner") and their
//! students.
//!
//! The engine combines one-off and recurring bookings with work hours, breaks,
//! weekends and vacations. It is synchronous and keeps no state between calls:
//! every operation reads the owner's events through an [`EventStore`] and
//! computes fresh, using the [`EngineConfig`] it is handed.
//!
//! ## Modules
//!
//! - [`expander`]: recurring event + date → concrete occurrence
//! - [`compositor`]: a day's effective occupied windows
//! - [`freebusy`]: bookable lesson start times
//! - [`conflict`]: weekly overlap audit with classified violations
//! - [`breaks`]: automatic breaks after long lesson runs
//! - [`booking`]: owner-locked writes (book, move, cancel)
//! - [`calendar`]: an owner's events as loaded for one computation
//! - [`store`]: persistence trait and in-memory store
//! - [`model`]: events, identifiers, occurrences
//! - [`config`]: engine configuration
//! - [`dst`]: DST policies and local-time resolution
//! - [`error`]: error types

pub mod booking;
pub mod breaks;
pub mod calendar;
pub mod compositor;
pub mod config;
pub mod conflict;
pub mod dst;
pub mod error;
pub mod expander;
pub mod freebusy;
pub mod model;
pub mod store;

pub use booking::{Booked, Booker};
pub use breaks::{place_breaks, BreakPlacement};
pub use compositor::day_schedule;
pub use config::EngineConfig;
pub use conflict::{find_overlaps, render_overlaps, Overlap, Violation};
pub use error::{Result, ScheduleError};
pub use expander::{expand_series, occurrence_on};
pub use freebusy::{free_slots, free_slots_weekday, FreeSlots};
pub use model::{EventId, EventKind, Occurrence, OwnerId, ParticipantId};
pub use store::{CalendarSnapshot, EventStore, InMemoryStore};
