use serde::{Deserialize, Serialize};

use super::TimerState;
use crate::error::ValidationError;

/// Tick period of the countdown, in milliseconds.
pub const TICK_RESOLUTION_MS: u64 = 100;

/// Per-workspace duration and session settings.
///
/// Durations are in minutes. The engine reads them when a duration is
/// armed, so a change applies from the next duration on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationConfig {
    #[serde(default = "default_work_duration")]
    pub work_duration: u32,
    #[serde(default = "default_break_duration")]
    pub break_duration: u32,
    #[serde(default = "default_long_break_duration")]
    pub long_break_duration: u32,
    #[serde(default = "default_work_intervals")]
    pub work_intervals: u32,
    #[serde(default = "default_true")]
    pub autostart_work: bool,
    #[serde(default = "default_true")]
    pub autostart_break: bool,
    #[serde(default)]
    pub enable_website_filter: bool,
}

fn default_work_duration() -> u32 {
    25
}
fn default_break_duration() -> u32 {
    5
}
fn default_long_break_duration() -> u32 {
    15
}
fn default_work_intervals() -> u32 {
    4
}
fn default_true() -> bool {
    true
}

impl Default for DurationConfig {
    fn default() -> Self {
        Self {
            work_duration: default_work_duration(),
            break_duration: default_break_duration(),
            long_break_duration: default_long_break_duration(),
            work_intervals: default_work_intervals(),
            autostart_work: true,
            autostart_break: true,
            enable_website_filter: false,
        }
    }
}

impl DurationConfig {
    /// Check every numeric field against its allowed range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("work_duration", self.work_duration, 1, 240)?;
        check_range("break_duration", self.break_duration, 1, 60)?;
        check_range("long_break_duration", self.long_break_duration, 1, 60)?;
        check_range("work_intervals", self.work_intervals, 1, 10)?;
        Ok(())
    }

    /// Configured length of a duration in the given state, in milliseconds.
    ///
    /// `Nothing` has no length.
    pub fn duration_ms(&self, state: TimerState) -> u64 {
        let minutes = match state {
            TimerState::Nothing => return 0,
            TimerState::Work => self.work_duration,
            TimerState::Break => self.break_duration,
            TimerState::LongBreak => self.long_break_duration,
        };
        u64::from(minutes).saturating_mul(60_000)
    }

    /// Whether a duration of the arriving state starts without user input.
    pub fn autostarts(&self, state: TimerState) -> bool {
        match state {
            TimerState::Work => self.autostart_work,
            TimerState::Break | TimerState::LongBreak => self.autostart_break,
            TimerState::Nothing => false,
        }
    }
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            value,
        })
    }
}
