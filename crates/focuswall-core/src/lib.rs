//! # Focuswall Core Library
//!
//! This library provides the core logic for the Focuswall focus timer: a
//! pomodoro-style session engine paired with a website filter that only
//! runs while you work. Front ends (the `focuswall` CLI) are thin layers
//! over the same core.
//!
//! ## Architecture
//!
//! - **Timer Engine**: A pure state machine over work/break/long-break
//!   durations; the caller invokes `tick()` every 100 ms
//! - **Session Coordinator**: Reacts to timer events by locking settings,
//!   toggling the website filter and accruing time on the current task
//! - **Website Filter**: Runs an external intercepting proxy with a
//!   generated rule script and registers it as the system proxy
//! - **Storage**: SQLite workspaces and tasks, TOML configuration
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Core timer state machine
//! - [`SessionCoordinator`]: Side effects of a running session
//! - [`FilterProcessManager`]: Filtering process and proxy lifecycle
//! - [`Database`]: Workspace and task persistence
//! - [`Config`]: Application configuration management

pub mod coordinator;
pub mod error;
pub mod events;
pub mod filter;
pub mod storage;
pub mod timer;
pub mod update;
pub mod workspace;

pub use coordinator::{CurrentTask, SessionCoordinator, SessionStore};
pub use error::{
    ConfigError, CoreError, DatabaseError, FilterError, Result, TimerError, UpdateError,
    ValidationError,
};
pub use events::{Event, NoticeLevel};
pub use filter::{FilterControl, FilterMode, FilterProcessManager, FilterRequest, FilterRuleSet};
pub use storage::{Config, Database};
pub use timer::{DurationConfig, SessionProgress, TimerEngine, TimerState, TICK_RESOLUTION_MS};
pub use update::{UpdateChecker, UpdateStatus};
pub use workspace::{Task, TaskType, Workspace};
