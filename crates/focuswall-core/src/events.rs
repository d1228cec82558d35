use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::TimerState;

/// Every state change in the system produces an Event.
///
/// The engine and the coordinator return events in the order they happened;
/// front ends render them, nothing is delivered implicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStateChanged {
        state: TimerState,
        is_skipped: bool,
        at: DateTime<Utc>,
    },
    SessionStarted {
        at: DateTime<Utc>,
    },
    SessionPaused {
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    SessionStopped {
        at: DateTime<Utc>,
    },
    DurationSkipped {
        from: TimerState,
        at: DateTime<Utc>,
    },
    /// The next duration is armed but autostart is off for it.
    WaitForUserInput {
        state: TimerState,
        at: DateTime<Utc>,
    },
    DurationStarted {
        state: TimerState,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    Countdown {
        remaining_ms: u64,
    },
    StateSnapshot {
        state: TimerState,
        session_progress: f64,
        remaining_ms: u64,
        ticking: bool,
        at: DateTime<Utc>,
    },
    /// Duration and workspace settings are locked during a session.
    ControlsLocked {
        locked: bool,
        at: DateTime<Utc>,
    },
    FilteringChanged {
        active: bool,
        at: DateTime<Utc>,
    },
    CurrentTaskChanged {
        task_id: Option<String>,
        at: DateTime<Utc>,
    },
    ElapsedFlushed {
        task_id: String,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
    /// Non-blocking, dismissible notification for the user.
    Notice {
        level: NoticeLevel,
        message: String,
        at: DateTime<Utc>,
    },
    UpdateAvailable {
        current: String,
        latest: String,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

impl Event {
    pub fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        Event::Notice {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    /// Stable snake_case name of the variant, as serialized in `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::TimerStateChanged { .. } => "timer_state_changed",
            Event::SessionStarted { .. } => "session_started",
            Event::SessionPaused { .. } => "session_paused",
            Event::SessionStopped { .. } => "session_stopped",
            Event::DurationSkipped { .. } => "duration_skipped",
            Event::WaitForUserInput { .. } => "wait_for_user_input",
            Event::DurationStarted { .. } => "duration_started",
            Event::Countdown { .. } => "countdown",
            Event::StateSnapshot { .. } => "state_snapshot",
            Event::ControlsLocked { .. } => "controls_locked",
            Event::FilteringChanged { .. } => "filtering_changed",
            Event::CurrentTaskChanged { .. } => "current_task_changed",
            Event::ElapsedFlushed { .. } => "elapsed_flushed",
            Event::Notice { .. } => "notice",
            Event::UpdateAvailable { .. } => "update_available",
        }
    }
}
