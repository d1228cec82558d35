//! Timer engine implementation.
//!
//! The engine is a pure state machine over work/break/long-break durations.
//! It owns no thread and no clock: the caller invokes `tick()` every
//! [`TICK_RESOLUTION_MS`] while a duration is running, and every command
//! returns the events it produced, in order.
//!
//! ## State Transitions
//!
//! ```text
//! Nothing -> Work -> Break -> Work -> ... -> Work -> LongBreak -> Work
//!    ^                                                              |
//!    +--------------------------- stop_session ---------------------+
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(DurationConfig::default());
//! engine.start_session();
//! // Every 100 ms:
//! for event in engine.tick() { /* react */ }
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::durations::{DurationConfig, TICK_RESOLUTION_MS};
use super::progress::SessionProgress;
use crate::error::TimerError;
use crate::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    /// Idle; reached initially and after `stop_session`.
    Nothing,
    Work,
    Break,
    LongBreak,
}

impl TimerState {
    /// True for the three states in which a session is underway.
    pub fn is_active(self) -> bool {
        !matches!(self, TimerState::Nothing)
    }
}

impl std::fmt::Display for TimerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TimerState::Nothing => "nothing",
            TimerState::Work => "work",
            TimerState::Break => "break",
            TimerState::LongBreak => "long_break",
        };
        f.write_str(name)
    }
}

/// Core timer engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerEngine {
    durations: DurationConfig,
    state: TimerState,
    progress: SessionProgress,
    /// Remaining time in milliseconds for the current duration.
    remaining_ms: u64,
    /// Whether the tick source should be driving this engine.
    ticking: bool,
}

impl TimerEngine {
    /// Create an idle engine reading duration lengths from `durations`.
    pub fn new(durations: DurationConfig) -> Self {
        Self {
            durations,
            state: TimerState::Nothing,
            progress: SessionProgress::ZERO,
            remaining_ms: 0,
            ticking: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn session_progress(&self) -> SessionProgress {
        self.progress
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    pub fn is_ticking(&self) -> bool {
        self.ticking
    }

    /// Nothing is running and nothing is armed.
    pub fn is_idle(&self) -> bool {
        self.remaining_ms == 0 && !self.ticking
    }

    pub fn durations(&self) -> &DurationConfig {
        &self.durations
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot {
            state: self.state,
            session_progress: self.progress.value(),
            remaining_ms: self.remaining_ms,
            ticking: self.ticking,
            at: Utc::now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Replace the duration settings. Lengths apply from the next armed duration.
    pub fn apply_durations(&mut self, durations: DurationConfig) {
        self.durations = durations;
        self.progress.wrap_above(durations.work_intervals);
    }

    /// Start button: begins a session from `Nothing`, otherwise resumes.
    pub fn start_session(&mut self) -> Vec<Event> {
        if self.ticking {
            return Vec::new();
        }
        let mut events = Vec::new();
        if self.state == TimerState::Nothing {
            events.extend(self.update_session_progress());
        }
        events.push(Event::SessionStarted { at: Utc::now() });
        events.extend(self.start_duration());
        events
    }

    /// Resume a paused duration, or arm and start a fresh one for the current state.
    pub fn start_duration(&mut self) -> Vec<Event> {
        if self.state == TimerState::Nothing {
            warn!("start_duration called while idle; transition first");
            return Vec::new();
        }
        if self.ticking {
            return Vec::new();
        }
        if self.remaining_ms == 0 {
            self.arm();
        }
        self.ticking = true;
        vec![Event::DurationStarted {
            state: self.state,
            duration_ms: self.remaining_ms,
            at: Utc::now(),
        }]
    }

    /// Stop ticking without touching the remaining time. Idempotent.
    pub fn pause_duration(&mut self) -> Vec<Event> {
        if !self.ticking {
            return Vec::new();
        }
        self.ticking = false;
        vec![Event::SessionPaused {
            remaining_ms: self.remaining_ms,
            at: Utc::now(),
        }]
    }

    /// Call every [`TICK_RESOLUTION_MS`] while ticking.
    pub fn tick(&mut self) -> Vec<Event> {
        if !self.ticking {
            return Vec::new();
        }
        if self.remaining_ms < TICK_RESOLUTION_MS {
            return self.duration_ended(false);
        }
        self.remaining_ms -= TICK_RESOLUTION_MS;
        vec![Event::Countdown {
            remaining_ms: self.remaining_ms,
        }]
    }

    /// End the current duration now and start the next one unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::SkipWhileIdle`] when no duration is running or armed.
    pub fn skip_duration(&mut self) -> Result<Vec<Event>, TimerError> {
        if self.is_idle() {
            return Err(TimerError::SkipWhileIdle);
        }
        let from = self.state;
        self.remaining_ms = 0;
        let mut events = vec![Event::DurationSkipped {
            from,
            at: Utc::now(),
        }];
        events.extend(self.duration_ended(true));
        Ok(events)
    }

    /// Advance to the next duration and decide whether it starts by itself.
    pub fn duration_ended(&mut self, is_skipped: bool) -> Vec<Event> {
        self.ticking = false;
        let mut events = self.transition(is_skipped);
        self.arm();
        if is_skipped || self.durations.autostarts(self.state) {
            self.ticking = true;
            events.push(Event::DurationStarted {
                state: self.state,
                duration_ms: self.remaining_ms,
                at: Utc::now(),
            });
        } else {
            debug!(state = %self.state, "autostart disabled; waiting for user input");
            events.push(Event::WaitForUserInput {
                state: self.state,
                at: Utc::now(),
            });
        }
        events
    }

    /// Pure state-machine step: advance progress by half a cycle and pick the next state.
    pub fn update_session_progress(&mut self) -> Vec<Event> {
        self.transition(false)
    }

    /// Halt everything and return to `Nothing`.
    pub fn stop_session(&mut self) -> Vec<Event> {
        self.ticking = false;
        self.remaining_ms = 0;
        self.progress = SessionProgress::ZERO;
        self.state = TimerState::Nothing;
        let at = Utc::now();
        vec![
            Event::TimerStateChanged {
                state: TimerState::Nothing,
                is_skipped: false,
                at,
            },
            Event::SessionStopped { at },
        ]
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn transition(&mut self, is_skipped: bool) -> Vec<Event> {
        let intervals = self.durations.work_intervals;
        let next = match self.state {
            TimerState::Nothing | TimerState::Break | TimerState::LongBreak => TimerState::Work,
            TimerState::Work if self.progress.at_last_work(intervals) => TimerState::LongBreak,
            TimerState::Work => TimerState::Break,
        };
        let leaving_long_break = self.state == TimerState::LongBreak;
        self.progress.advance();
        if leaving_long_break {
            self.progress.wrap(intervals);
        }
        self.progress.wrap_above(intervals);
        self.state = next;
        debug!(state = %next, progress = %self.progress, "timer state changed");
        vec![Event::TimerStateChanged {
            state: next,
            is_skipped,
            at: Utc::now(),
        }]
    }

    fn arm(&mut self) {
        self.remaining_ms = self.durations.duration_ms(self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(intervals: u32) -> DurationConfig {
        DurationConfig {
            work_intervals: intervals,
            ..Default::default()
        }
    }

    fn states(events: &[Event]) -> Vec<TimerState> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::TimerStateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn starts_idle() {
        let engine = TimerEngine::new(config(4));
        assert_eq!(engine.state(), TimerState::Nothing);
        assert_eq!(engine.session_progress(), SessionProgress::ZERO);
        assert!(engine.is_idle());
    }

    #[test]
    fn start_duration_while_nothing_is_a_no_op() {
        let mut engine = TimerEngine::new(config(4));
        assert!(engine.start_duration().is_empty());
        assert!(!engine.is_ticking());
    }

    #[test]
    fn start_session_enters_work_and_arms_duration() {
        let mut engine = TimerEngine::new(config(4));
        let events = engine.start_session();
        assert_eq!(states(&events), vec![TimerState::Work]);
        assert!(events.iter().any(|e| matches!(e, Event::SessionStarted { .. })));
        assert_eq!(engine.remaining_ms(), 25 * 60_000);
        assert!(engine.is_ticking());
        assert_eq!(engine.session_progress().value(), 0.5);
    }

    #[test]
    fn full_cycle_with_two_intervals() {
        let mut engine = TimerEngine::new(config(2));
        engine.update_session_progress();
        assert_eq!(engine.state(), TimerState::Work);
        assert_eq!(engine.session_progress().value(), 0.5);

        let expected = [
            (TimerState::Break, 1.0),
            (TimerState::Work, 1.5),
            (TimerState::LongBreak, 2.0),
            (TimerState::Work, 0.5),
        ];
        for (state, progress) in expected {
            engine.duration_ended(false);
            assert_eq!(engine.state(), state);
            assert_eq!(engine.session_progress().value(), progress);
        }
    }

    #[test]
    fn tick_counts_down_and_ends_duration() {
        let mut engine = TimerEngine::new(DurationConfig {
            work_duration: 1,
            ..Default::default()
        });
        engine.start_session();
        for _ in 0..600 {
            let events = engine.tick();
            assert!(matches!(events[0], Event::Countdown { .. }));
        }
        assert_eq!(engine.remaining_ms(), 0);
        let events = engine.tick();
        assert_eq!(states(&events), vec![TimerState::Break]);
        assert_eq!(engine.remaining_ms(), 5 * 60_000);
        assert!(engine.is_ticking());
    }

    #[test]
    fn skip_starts_next_duration_regardless_of_autostart() {
        let mut engine = TimerEngine::new(DurationConfig {
            autostart_work: false,
            autostart_break: false,
            ..Default::default()
        });
        engine.start_session();
        for _ in 0..10 {
            engine.tick();
        }
        let events = engine.skip_duration().unwrap();
        assert!(matches!(
            events[0],
            Event::DurationSkipped {
                from: TimerState::Work,
                ..
            }
        ));
        assert!(matches!(
            events[1],
            Event::TimerStateChanged {
                state: TimerState::Break,
                is_skipped: true,
                ..
            }
        ));
        assert_eq!(engine.remaining_ms(), 5 * 60_000);
        assert!(engine.is_ticking());
    }

    #[test]
    fn skip_while_idle_is_an_error() {
        let mut engine = TimerEngine::new(config(4));
        assert!(matches!(
            engine.skip_duration(),
            Err(TimerError::SkipWhileIdle)
        ));

        engine.start_session();
        engine.stop_session();
        assert!(matches!(
            engine.skip_duration(),
            Err(TimerError::SkipWhileIdle)
        ));
    }

    #[test]
    fn disabled_autostart_waits_with_armed_duration() {
        let mut engine = TimerEngine::new(DurationConfig {
            autostart_break: false,
            ..Default::default()
        });
        engine.start_session();
        let events = engine.duration_ended(false);
        assert!(matches!(
            events.last(),
            Some(Event::WaitForUserInput {
                state: TimerState::Break,
                ..
            })
        ));
        assert!(!engine.is_ticking());
        assert_eq!(engine.remaining_ms(), 5 * 60_000);

        // Waiting is not idle: the armed duration can be skipped or started.
        assert!(!engine.is_idle());
        engine.start_duration();
        assert!(engine.is_ticking());
        assert_eq!(engine.remaining_ms(), 5 * 60_000);
    }

    #[test]
    fn pause_is_idempotent_and_resume_keeps_remaining() {
        let mut engine = TimerEngine::new(config(4));
        engine.start_session();
        engine.tick();
        engine.tick();
        assert_eq!(engine.pause_duration().len(), 1);
        let remaining = engine.remaining_ms();
        assert!(engine.pause_duration().is_empty());
        assert_eq!(engine.remaining_ms(), remaining);
        assert!(engine.tick().is_empty());

        engine.start_session();
        assert_eq!(engine.remaining_ms(), remaining);
        assert!(engine.is_ticking());
    }

    #[test]
    fn stop_then_update_always_yields_first_work() {
        let mut engine = TimerEngine::new(config(3));
        engine.start_session();
        engine.duration_ended(false);
        engine.duration_ended(false);
        let events = engine.stop_session();
        assert!(matches!(events[1], Event::SessionStopped { .. }));
        assert_eq!(engine.state(), TimerState::Nothing);
        assert!(engine.is_idle());

        engine.update_session_progress();
        assert_eq!(engine.state(), TimerState::Work);
        assert_eq!(engine.session_progress().value(), 0.5);
    }

    #[test]
    fn lowering_intervals_mid_cycle_keeps_progress_in_range() {
        let mut engine = TimerEngine::new(config(4));
        engine.start_session();
        for _ in 0..6 {
            engine.duration_ended(false);
        }
        assert_eq!(engine.state(), TimerState::Work);
        assert_eq!(engine.session_progress().value(), 3.5);

        engine.apply_durations(config(2));
        assert!(engine.session_progress().within(2));
        assert_eq!(engine.state(), TimerState::Work);

        engine.duration_ended(false);
        assert_eq!(engine.state(), TimerState::LongBreak);
        assert!(engine.session_progress().within(2));
    }
}
