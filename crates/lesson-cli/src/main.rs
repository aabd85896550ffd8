//! `lessons` CLI: query and edit a lesson calendar stored as a JSON snapshot.
//!
//! ## Usage
//!
//! ```sh
//! # The day's schedule for owner 1
//! lessons -c calendar.json day --owner 1 --date 2026-10-19
//!
//! # Bookable starts, as seen from a given instant
//! lessons -c calendar.json free --owner 1 --date 2026-10-19 --now 2026-10-17T08:00:00Z
//!
//! # Starts for a new weekly lesson on Mondays
//! lessons -c calendar.json free-weekday --owner 1 --weekday mon
//!
//! # Weekly overlap audit (text, or --json)
//! lessons -c calendar.json overlaps --owner 1
//!
//! # Book a lesson and save the updated calendar
//! lessons -c calendar.json book --owner 1 --subject 7 \
//!     --start 2026-10-19T10:00:00Z -o calendar.json
//!
//! # Place missing breaks for a day
//! lessons -c calendar.json breaks --owner 1 --date 2026-10-19 -o calendar.json
//!
//! # Occurrences of a series
//! lessons -c calendar.json series --id re1 --from 2026-10-01 --to 2026-12-31
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use clap::{Parser, Subcommand};
use lesson_engine::{
    day_schedule, expand_series, find_overlaps, free_slots, free_slots_weekday, render_overlaps,
    Booker, CalendarSnapshot, EngineConfig, EventId, EventStore, InMemoryStore, OwnerId,
    ParticipantId,
};
use serde::Serialize;
use std::io::{self, Read};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lessons", version, about = "Lesson calendar engine CLI")]
struct Cli {
    /// Calendar snapshot (reads from stdin if omitted)
    #[arg(short, long, global = true)]
    calendar: Option<String>,

    /// Engine configuration as JSON (defaults if omitted)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective schedule of a day
    Day {
        #[arg(long)]
        owner: u64,
        #[arg(long)]
        date: NaiveDate,
        /// Only entries for this participant
        #[arg(long)]
        subject: Option<u64>,
    },
    /// Print bookable lesson starts for a day
    Free {
        #[arg(long)]
        owner: u64,
        #[arg(long)]
        date: NaiveDate,
        /// Reference instant (RFC 3339, defaults to the current time)
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },
    /// Print starts usable for a weekly lesson on the next given weekday
    FreeWeekday {
        #[arg(long)]
        owner: u64,
        #[arg(long)]
        weekday: Weekday,
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },
    /// Audit the calendar for colliding events
    Overlaps {
        #[arg(long)]
        owner: u64,
        #[arg(long)]
        now: Option<DateTime<Utc>>,
        /// Print JSON instead of one line per violation
        #[arg(long)]
        json: bool,
    },
    /// Book a one-off lesson
    Book {
        #[arg(long)]
        owner: u64,
        #[arg(long)]
        subject: u64,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        now: Option<DateTime<Utc>>,
        /// Write the updated calendar here
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Place the breaks a day needs after long lesson runs
    Breaks {
        #[arg(long)]
        owner: u64,
        #[arg(long)]
        date: NaiveDate,
        /// Write the updated calendar here
        #[arg(short, long)]
        output: Option<String>,
    },
    /// List the occurrences of a recurring event
    Series {
        /// Series id, e.g. `re12`
        #[arg(long)]
        id: EventId,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let store = load_calendar(cli.calendar.as_deref())?;

    match cli.command {
        Commands::Day {
            owner,
            date,
            subject,
        } => {
            let subject = subject.map(ParticipantId);
            let schedule = day_schedule(&store, &config, OwnerId(owner), date, subject)
                .context("Failed to compose the day")?;
            print_json(&schedule)?;
        }
        Commands::Free { owner, date, now } => {
            let now = now.unwrap_or_else(Utc::now);
            let slots = free_slots(&store, &config, OwnerId(owner), date, now)
                .context("Failed to compute free slots")?;
            print_json(&slots)?;
        }
        Commands::FreeWeekday {
            owner,
            weekday,
            now,
        } => {
            let slots = free_slots_weekday(
                &store,
                &config,
                OwnerId(owner),
                weekday,
                now.unwrap_or_else(Utc::now),
            )
            .context("Failed to compute weekly free slots")?;
            print_json(&slots)?;
        }
        Commands::Overlaps { owner, now, json } => {
            let now = now.unwrap_or_else(Utc::now);
            let overlaps = find_overlaps(&store, &config, OwnerId(owner), now)
                .context("Failed to audit the calendar")?;
            if json {
                print_json(&overlaps)?;
            } else {
                print!("{}", render_overlaps(&overlaps));
            }
        }
        Commands::Book {
            owner,
            subject,
            start,
            now,
            output,
        } => {
            let booker = Booker::new(store);
            let booked = booker
                .book_lesson(
                    &config,
                    OwnerId(owner),
                    ParticipantId(subject),
                    start,
                    now.unwrap_or_else(Utc::now),
                )
                .context("Failed to book the lesson")?;
            print_json(&booked)?;
            save_calendar(output.as_deref(), booker.store())?;
        }
        Commands::Breaks {
            owner,
            date,
            output,
        } => {
            let booker = Booker::new(store);
            let placement = booker
                .place_breaks(&config, OwnerId(owner), date)
                .context("Failed to place breaks")?;
            print_json(&placement)?;
            save_calendar(output.as_deref(), booker.store())?;
        }
        Commands::Series { id, from, to } => {
            let EventId::Recurring(id) = id else {
                bail!("'{}' is not a recurring event id", id);
            };
            let series = store.recurring_event(id)?;
            let cancellations = store.list_cancellations(&[id])?;
            let occurrences = expand_series(&series, &cancellations, from, to, &config)
                .context("Failed to expand the series")?;
            print_json(&occurrences)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path))?;
            EngineConfig::from_json(&json).with_context(|| format!("Invalid config: {}", path))
        }
        None => Ok(EngineConfig::default()),
    }
}

fn load_calendar(path: Option<&str>) -> Result<InMemoryStore> {
    let json = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read calendar: {}", path))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read calendar from stdin")?;
            buf
        }
    };
    let snapshot: CalendarSnapshot =
        serde_json::from_str(&json).context("Calendar is not a valid snapshot")?;
    debug!(
        single = snapshot.single_events.len(),
        recurring = snapshot.recurring_events.len(),
        cancellations = snapshot.cancellations.len(),
        "loaded calendar"
    );
    Ok(InMemoryStore::from_snapshot(snapshot)?)
}

fn save_calendar(path: Option<&str>, store: &InMemoryStore) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let json = serde_json::to_string_pretty(&store.snapshot())?;
    std::fs::write(path, json).with_context(|| format!("Failed to write calendar: {}", path))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
