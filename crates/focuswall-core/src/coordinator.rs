//! Session coordinator.
//!
//! Bridges timer state changes to their side effects: locking settings
//! during a session, toggling the website filter, accruing elapsed time on
//! the current task and keeping that task selected. The timer engine knows
//! nothing about any of this.
//!
//! Every command returns the engine's events, each followed by the
//! reactions it caused. Persistence and filter failures never escape a
//! reaction; they are logged and reported as [`Event::Notice`].

use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::events::{Event, NoticeLevel};
use crate::filter::{FilterControl, FilterRequest};
use crate::storage::{Config, Database};
use crate::timer::{DurationConfig, TimerEngine, TimerState, TICK_RESOLUTION_MS};
use crate::workspace::{Task, TaskType, Workspace};

/// Read/write access to the records a running session touches.
pub trait SessionStore: Send {
    /// The currently selected workspace.
    fn active_workspace(&self) -> Result<Workspace>;
    fn task(&self, id: &str) -> Result<Option<Task>>;
    fn first_todo_task(&self, workspace_id: &str) -> Result<Option<Task>>;
    fn save_elapsed(&self, task_id: &str, elapsed_ms: u64) -> Result<()>;
    fn set_active_workspace(&self, id: &str) -> Result<Workspace>;
    fn save_durations(&self, workspace_id: &str, durations: &DurationConfig) -> Result<()>;
}

impl SessionStore for Database {
    fn active_workspace(&self) -> Result<Workspace> {
        self.ensure_default_workspace()
    }

    fn task(&self, id: &str) -> Result<Option<Task>> {
        self.get_task(id)
    }

    fn first_todo_task(&self, workspace_id: &str) -> Result<Option<Task>> {
        Database::first_todo_task(self, workspace_id)
    }

    fn save_elapsed(&self, task_id: &str, elapsed_ms: u64) -> Result<()> {
        self.set_elapsed(task_id, elapsed_ms)
    }

    fn set_active_workspace(&self, id: &str) -> Result<Workspace> {
        self.set_current_workspace_id(id)?;
        self.get_workspace(id)?.ok_or_else(|| CoreError::NotFound {
            kind: "workspace",
            id: id.to_string(),
        })
    }

    fn save_durations(&self, workspace_id: &str, durations: &DurationConfig) -> Result<()> {
        let mut ws = self
            .get_workspace(workspace_id)?
            .ok_or_else(|| CoreError::NotFound {
                kind: "workspace",
                id: workspace_id.to_string(),
            })?;
        ws.durations = *durations;
        self.update_workspace(&ws)
    }
}

/// The task elapsed time accrues to, with its unflushed total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentTask {
    pub id: String,
    pub elapsed_ms: u64,
}

/// Drives a [`TimerEngine`] and applies the session's side effects.
pub struct SessionCoordinator {
    engine: TimerEngine,
    filter: Box<dyn FilterControl>,
    store: Box<dyn SessionStore>,
    workspace: Workspace,
    flush_interval_ms: u64,
    filter_port: u16,
    filter_binary: PathBuf,
    current: Option<CurrentTask>,
    selected: Option<String>,
    controls_locked: bool,
}

impl SessionCoordinator {
    /// Build a coordinator for the store's active workspace.
    pub fn new(
        store: Box<dyn SessionStore>,
        filter: Box<dyn FilterControl>,
        config: &Config,
    ) -> Result<Self> {
        let workspace = store.active_workspace()?;
        info!(workspace = %workspace.name, "session coordinator ready");
        Ok(Self {
            engine: TimerEngine::new(workspace.durations),
            filter,
            store,
            workspace,
            flush_interval_ms: config.session.flush_interval_ms,
            filter_port: config.filter.listening_port,
            filter_binary: PathBuf::from(&config.filter.binary_path),
            current: None,
            selected: None,
            controls_locked: false,
        })
    }

    pub fn engine(&self) -> &TimerEngine {
        &self.engine
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    pub fn current_task(&self) -> Option<&CurrentTask> {
        self.current.as_ref()
    }

    pub fn selected_task(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Whether duration and workspace settings are locked.
    pub fn controls_locked(&self) -> bool {
        self.controls_locked
    }

    pub fn is_filtering(&self) -> bool {
        self.filter.is_filtering()
    }

    pub fn snapshot(&self) -> Event {
        self.engine.snapshot()
    }

    /// Timer snapshot followed by the current task.
    pub fn status(&self) -> Vec<Event> {
        vec![
            self.engine.snapshot(),
            Event::CurrentTaskChanged {
                task_id: self.current.as_ref().map(|c| c.id.clone()),
                at: Utc::now(),
            },
        ]
    }

    // ── Timer commands ───────────────────────────────────────────────

    pub fn start(&mut self) -> Vec<Event> {
        let events = self.engine.start_session();
        self.react(events)
    }

    pub fn pause(&mut self) -> Vec<Event> {
        let events = self.engine.pause_duration();
        self.react(events)
    }

    /// # Errors
    ///
    /// Fails when the timer is idle; nothing changes in that case.
    pub fn skip(&mut self) -> Result<Vec<Event>> {
        let events = self.engine.skip_duration()?;
        Ok(self.react(events))
    }

    pub fn stop(&mut self) -> Vec<Event> {
        let events = self.engine.stop_session();
        self.react(events)
    }

    /// Advance by one [`TICK_RESOLUTION_MS`] period.
    pub fn tick(&mut self) -> Vec<Event> {
        let events = self.engine.tick();
        self.react(events)
    }

    // ── Tasks ────────────────────────────────────────────────────────

    /// Record the user's pick for the next automatic selection.
    ///
    /// During a work duration with no current task, the pick applies at once.
    pub fn select_task(&mut self, task_id: Option<&str>) -> Result<Vec<Event>> {
        let Some(id) = task_id else {
            self.selected = None;
            return Ok(Vec::new());
        };
        let task = self.workspace_task(id)?;
        self.selected = Some(task.id.clone());
        let mut out = Vec::new();
        if self.current.is_none() && self.engine.state() == TimerState::Work {
            self.make_current(Some(task), &mut out);
        }
        Ok(out)
    }

    /// Replace the current task, flushing the time of the previous one.
    pub fn set_current_task(&mut self, task_id: Option<&str>) -> Result<Vec<Event>> {
        let task = match task_id {
            Some(id) => Some(self.workspace_task(id)?),
            None => None,
        };
        let mut out = Vec::new();
        self.flush_elapsed(&mut out);
        self.make_current(task, &mut out);
        Ok(out)
    }

    /// The task was deleted elsewhere.
    pub fn task_removed(&mut self, task_id: &str) -> Vec<Event> {
        self.release_task(task_id, false, "was deleted")
    }

    /// The task was moved to the completed list elsewhere.
    pub fn task_completed(&mut self, task_id: &str) -> Vec<Event> {
        self.release_task(task_id, true, "was completed")
    }

    // ── Settings ─────────────────────────────────────────────────────

    /// Re-read configuration and the active workspace.
    ///
    /// New durations reach the engine at its next armed duration; filter
    /// rules are used by the next filter start.
    pub fn refresh_settings(&mut self, config: &Config) -> Result<Vec<Event>> {
        self.flush_interval_ms = config.session.flush_interval_ms;
        self.filter_port = config.filter.listening_port;
        self.filter_binary = PathBuf::from(&config.filter.binary_path);

        let workspace = self.store.active_workspace()?;
        let mut out = Vec::new();
        if workspace.id != self.workspace.id {
            self.forget_tasks(&mut out);
        }
        self.engine.apply_durations(workspace.durations);
        debug!(workspace = %workspace.name, "settings refreshed");
        self.workspace = workspace;
        Ok(out)
    }

    /// # Errors
    ///
    /// Refused with [`CoreError::SessionActive`] while controls are locked.
    pub fn switch_workspace(&mut self, workspace_id: &str) -> Result<Vec<Event>> {
        if self.controls_locked {
            return Err(CoreError::SessionActive {
                action: "switch workspaces",
            });
        }
        let workspace = self.store.set_active_workspace(workspace_id)?;
        let mut out = Vec::new();
        if workspace.id != self.workspace.id {
            self.forget_tasks(&mut out);
        }
        self.engine.apply_durations(workspace.durations);
        info!(workspace = %workspace.name, "workspace switched");
        self.workspace = workspace;
        Ok(out)
    }

    /// # Errors
    ///
    /// Refused with [`CoreError::SessionActive`] while controls are locked,
    /// or a validation error for out-of-range values.
    pub fn update_durations(&mut self, durations: DurationConfig) -> Result<()> {
        if self.controls_locked {
            return Err(CoreError::SessionActive {
                action: "change durations",
            });
        }
        durations.validate()?;
        self.store.save_durations(&self.workspace.id, &durations)?;
        self.engine.apply_durations(durations);
        self.workspace.durations = durations;
        Ok(())
    }

    /// Stop the session and the filter, waiting for background cleanup.
    pub fn shutdown(&mut self) -> Vec<Event> {
        let mut out = if self.engine.state() == TimerState::Nothing {
            let mut out = Vec::new();
            self.flush_elapsed(&mut out);
            out
        } else {
            self.stop()
        };
        self.filter.shutdown();
        self.collect_notices(&mut out);
        info!("session coordinator shut down");
        out
    }

    // ── Reactions ────────────────────────────────────────────────────

    fn react(&mut self, events: Vec<Event>) -> Vec<Event> {
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            let mut reactions = Vec::new();
            match &event {
                Event::TimerStateChanged { state, .. } => {
                    self.set_controls_locked(state.is_active(), &mut reactions);
                    self.toggle_filter(*state, &mut reactions);
                }
                Event::DurationStarted {
                    state: TimerState::Work,
                    ..
                } => self.auto_select(&mut reactions),
                Event::SessionPaused { .. }
                | Event::SessionStopped { .. }
                | Event::DurationSkipped { .. } => self.flush_elapsed(&mut reactions),
                Event::Countdown { .. } if self.engine.state() == TimerState::Work => {
                    self.accrue(&mut reactions)
                }
                _ => {}
            }
            out.push(event);
            out.extend(reactions);
        }
        self.collect_notices(&mut out);
        out
    }

    fn set_controls_locked(&mut self, locked: bool, out: &mut Vec<Event>) {
        if self.controls_locked == locked {
            return;
        }
        self.controls_locked = locked;
        out.push(Event::ControlsLocked {
            locked,
            at: Utc::now(),
        });
    }

    fn toggle_filter(&mut self, state: TimerState, out: &mut Vec<Event>) {
        if self.workspace.durations.enable_website_filter && state == TimerState::Work {
            let request = FilterRequest {
                port: self.filter_port,
                rules: self.workspace.rules(),
                binary: self.filter_binary.clone(),
            };
            match self.filter.start_filtering(&request) {
                Ok(()) => out.push(Event::FilteringChanged {
                    active: true,
                    at: Utc::now(),
                }),
                Err(e) => {
                    warn!(error = %e, "website filter could not be started");
                    out.push(Event::notice(
                        NoticeLevel::Warning,
                        format!("Website filter could not be started: {e}"),
                    ));
                }
            }
        } else if self.filter.is_filtering() {
            self.filter.stop_filtering(true);
            out.push(Event::FilteringChanged {
                active: false,
                at: Utc::now(),
            });
        }
    }

    fn accrue(&mut self, out: &mut Vec<Event>) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        current.elapsed_ms += TICK_RESOLUTION_MS;
        if current.elapsed_ms.checked_rem(self.flush_interval_ms) == Some(0) {
            self.flush_elapsed(out);
        }
    }

    fn flush_elapsed(&mut self, out: &mut Vec<Event>) {
        let Some(current) = &self.current else {
            return;
        };
        match self.store.save_elapsed(&current.id, current.elapsed_ms) {
            Ok(()) => out.push(Event::ElapsedFlushed {
                task_id: current.id.clone(),
                elapsed_ms: current.elapsed_ms,
                at: Utc::now(),
            }),
            Err(CoreError::NotFound { kind: "task", .. }) => {
                let id = current.id.clone();
                debug!(task = %id, "current task is gone from the store");
                out.extend(self.release_task(&id, false, "was deleted"));
            }
            Err(e) => {
                warn!(task = %current.id, error = %e, "failed to save elapsed time");
                out.push(Event::notice(
                    NoticeLevel::Warning,
                    format!("Elapsed time could not be saved: {e}"),
                ));
            }
        }
    }

    fn auto_select(&mut self, out: &mut Vec<Event>) {
        if self.current.is_some() {
            return;
        }
        match self.next_task() {
            Ok(Some(task)) => self.make_current(Some(task), out),
            Ok(None) => debug!("no task to select"),
            Err(e) => {
                warn!(error = %e, "task auto-selection failed");
                out.push(Event::notice(
                    NoticeLevel::Warning,
                    format!("Could not select a task: {e}"),
                ));
            }
        }
    }

    /// Explicit selection if it is still a to-do task, else the top of the list.
    fn next_task(&mut self) -> Result<Option<Task>> {
        if let Some(id) = self.selected.clone() {
            match self.store.task(&id)? {
                Some(task) if self.selectable(&task) => return Ok(Some(task)),
                _ => self.selected = None,
            }
        }
        self.store.first_todo_task(&self.workspace.id)
    }

    fn selectable(&self, task: &Task) -> bool {
        task.workspace_id == self.workspace.id && task.task_type == TaskType::Todo
    }

    fn workspace_task(&self, id: &str) -> Result<Task> {
        match self.store.task(id)? {
            Some(task) if task.workspace_id == self.workspace.id => Ok(task),
            _ => Err(CoreError::NotFound {
                kind: "task",
                id: id.to_string(),
            }),
        }
    }

    fn make_current(&mut self, task: Option<Task>, out: &mut Vec<Event>) {
        let next = task.map(|t| CurrentTask {
            id: t.id,
            elapsed_ms: t.elapsed_time_ms,
        });
        if next.as_ref().map(|c| &c.id) == self.current.as_ref().map(|c| &c.id) {
            return;
        }
        debug!(task = ?next.as_ref().map(|c| &c.id), "current task changed");
        out.push(Event::CurrentTaskChanged {
            task_id: next.as_ref().map(|c| c.id.clone()),
            at: Utc::now(),
        });
        self.current = next;
    }

    fn release_task(&mut self, task_id: &str, flush: bool, what: &str) -> Vec<Event> {
        if self.selected.as_deref() == Some(task_id) {
            self.selected = None;
        }
        let mut out = Vec::new();
        if self.current.as_ref().map(|c| c.id.as_str()) != Some(task_id) {
            return out;
        }
        if flush {
            self.flush_elapsed(&mut out);
        }
        self.make_current(None, &mut out);
        if self.engine.state() != TimerState::Nothing {
            out.push(Event::notice(
                NoticeLevel::Info,
                format!("The current task {what}; time is no longer tracked"),
            ));
        }
        out
    }

    fn forget_tasks(&mut self, out: &mut Vec<Event>) {
        self.flush_elapsed(out);
        self.make_current(None, out);
        self.selected = None;
    }

    fn collect_notices(&mut self, out: &mut Vec<Event>) {
        for notice in self.filter.drain_notices() {
            out.push(Event::notice(NoticeLevel::Warning, notice.to_string()));
        }
    }
}
