//! Process-wide scheduling configuration.
//!
//! An [`EngineConfig`] is loaded once by the calling service and passed
//! explicitly into every engine call; the engine keeps no configuration of
//! its own between calls.

use chrono::{Duration, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dst::DstPolicy;
use crate::error::{Result, ScheduleError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Operating timezone for "now", day boundaries and recurring local times.
    pub timezone: Tz,
    /// Opening time used when a day has no WORK_START occurrence.
    pub default_work_start: NaiveTime,
    /// Closing time used when a day has no WORK_END occurrence.
    pub default_work_end: NaiveTime,
    /// Granularity of candidate start times.
    pub slot_size_minutes: u32,
    pub lesson_size_minutes: u32,
    /// Minimum notice between "now" and a bookable start.
    pub lead_time_minutes: u32,
    pub max_lessons_per_day: u32,
    /// Back-to-back lessons tolerated before a break is inserted.
    pub max_consecutive_lessons: u32,
    pub break_duration_minutes: u32,
    /// How far ahead bookings are accepted, and how far the overlap audit looks.
    pub booking_horizon_days: u32,
    pub dst_policy: DstPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            default_work_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            default_work_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            slot_size_minutes: 15,
            lesson_size_minutes: 60,
            lead_time_minutes: 120,
            max_lessons_per_day: 8,
            max_consecutive_lessons: 3,
            break_duration_minutes: 15,
            booking_horizon_days: 60,
            dst_policy: DstPolicy::WallClock,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| ScheduleError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.slot_size_minutes == 0 {
            return Err(ScheduleError::InvalidConfig(
                "slot_size_minutes must be positive".to_string(),
            ));
        }
        if self.lesson_size_minutes == 0 || self.break_duration_minutes == 0 {
            return Err(ScheduleError::InvalidConfig(
                "lesson and break durations must be positive".to_string(),
            ));
        }
        if self.max_consecutive_lessons == 0 {
            return Err(ScheduleError::InvalidConfig(
                "max_consecutive_lessons must be positive".to_string(),
            ));
        }
        if self.default_work_end <= self.default_work_start {
            return Err(ScheduleError::InvalidConfig(format!(
                "default work window {}-{} is empty",
                self.default_work_start, self.default_work_end
            )));
        }
        Ok(())
    }

    pub fn slot_size(&self) -> Duration {
        Duration::minutes(self.slot_size_minutes as i64)
    }

    pub fn lesson_size(&self) -> Duration {
        Duration::minutes(self.lesson_size_minutes as i64)
    }

    pub fn lead_time(&self) -> Duration {
        Duration::minutes(self.lead_time_minutes as i64)
    }

    pub fn break_duration(&self) -> Duration {
        Duration::minutes(self.break_duration_minutes as i64)
    }

    pub fn booking_horizon(&self) -> Duration {
        Duration::days(self.booking_horizon_days as i64)
    }
}
