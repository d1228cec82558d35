mod durations;
mod engine;
mod progress;

pub use durations::{DurationConfig, TICK_RESOLUTION_MS};
pub use engine::{TimerEngine, TimerState};
pub use progress::SessionProgress;
