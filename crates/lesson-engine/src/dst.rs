//! DST transition policies and local-time resolution in the operating timezone.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Policy for recurring occurrences whose local time falls into a DST gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// No occurrence when the local time does not exist (02:30 on a
    /// spring-forward night).
    Skip,
    /// Move to the first valid local time after the gap (02:30 becomes 03:00).
    ShiftForward,
    /// Read the local time with the offset in force before the gap, so it
    /// keeps its distance from midnight (02:30 becomes 03:30).
    #[default]
    WallClock,
}

/// Resolve a local wall-clock datetime in `tz` to a UTC instant.
///
/// Ambiguous times (fall back) always take the earliest mapping. Times inside
/// a gap (spring forward) are handled per [`DstPolicy`].
pub fn resolve_local(tz: &Tz, local: NaiveDateTime, policy: DstPolicy) -> Option<DateTime<Utc>> {
    if let Some(dt) = tz.from_local_datetime(&local).earliest() {
        return Some(dt.with_timezone(&Utc));
    }

    // Gaps are at most a couple of hours wide; search in 15-minute steps.
    match policy {
        DstPolicy::Skip => None,
        DstPolicy::ShiftForward => (1..=12).find_map(|step| {
            tz.from_local_datetime(&(local + Duration::minutes(15 * step)))
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
        }),
        DstPolicy::WallClock => (1..=12)
            .find_map(|step| {
                tz.from_local_datetime(&(local - Duration::minutes(15 * step)))
                    .latest()
            })
            .map(|before| {
                let offset = before.offset().fix().local_minus_utc();
                Utc.from_utc_datetime(&(local - Duration::seconds(offset as i64)))
            }),
    }
}

/// The UTC half-open range `[start, end)` covered by local `date` in `tz`.
pub fn day_bounds(tz: &Tz, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_midnight(tz, date);
    let end = match date.succ_opt() {
        Some(next) => local_midnight(tz, next),
        None => start + Duration::days(1),
    };
    (start, end)
}

fn local_midnight(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    resolve_local(tz, naive, DstPolicy::ShiftForward)
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Local calendar date of a UTC instant.
pub fn local_date(tz: &Tz, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

/// Local wall-clock time of a UTC instant.
pub fn local_time(tz: &Tz, instant: DateTime<Utc>) -> NaiveTime {
    instant.with_timezone(tz).time()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_time_follows_policy() {
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        // 2026-03-29 02:30 does not exist in Berlin.
        let local = NaiveDate::from_ymd_opt(2026, 3, 29)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();

        assert_eq!(resolve_local(&tz, local, DstPolicy::Skip), None);

        let shifted = resolve_local(&tz, local, DstPolicy::ShiftForward).unwrap();
        // 03:00 CEST == 01:00 UTC
        assert_eq!(shifted, Utc.with_ymd_and_hms(2026, 3, 29, 1, 0, 0).unwrap());

        let wall = resolve_local(&tz, local, DstPolicy::WallClock).unwrap();
        // Read with the CET offset: 01:30 UTC == 03:30 CEST
        assert_eq!(wall, Utc.with_ymd_and_hms(2026, 3, 29, 1, 30, 0).unwrap());
    }

    #[test]
    fn day_bounds_follow_local_midnight() {
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        let (start, end) = day_bounds(&tz, NaiveDate::from_ymd_opt(2026, 3, 29).unwrap());
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 28, 23, 0, 0).unwrap());
        // Spring-forward day is 23 hours long.
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 29, 22, 0, 0).unwrap());
    }
}
