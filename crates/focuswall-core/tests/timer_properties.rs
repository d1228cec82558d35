//! Property tests for the timer engine's invariants.

use focuswall_core::{DurationConfig, TimerEngine, TimerState};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Start,
    Pause,
    Ticks(u16),
    Skip,
    Stop,
    Step,
    Intervals(u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Start),
        Just(Op::Pause),
        (1u16..700).prop_map(Op::Ticks),
        Just(Op::Skip),
        Just(Op::Stop),
        Just(Op::Step),
        (1u32..=10).prop_map(Op::Intervals),
    ]
}

fn short_config(intervals: u32, autostart: bool) -> DurationConfig {
    DurationConfig {
        work_duration: 1,
        break_duration: 1,
        long_break_duration: 1,
        work_intervals: intervals,
        autostart_work: autostart,
        autostart_break: autostart,
        enable_website_filter: false,
    }
}

fn apply(engine: &mut TimerEngine, op: &Op) {
    match op {
        Op::Start => {
            engine.start_session();
        }
        Op::Pause => {
            engine.pause_duration();
        }
        Op::Ticks(n) => {
            for _ in 0..*n {
                engine.tick();
            }
        }
        Op::Skip => {
            let idle = engine.is_idle();
            assert_eq!(engine.skip_duration().is_err(), idle);
        }
        Op::Stop => {
            engine.stop_session();
        }
        Op::Step => {
            engine.update_session_progress();
        }
        Op::Intervals(n) => {
            let mut config = *engine.durations();
            config.work_intervals = *n;
            engine.apply_durations(config);
        }
    }
}

proptest! {
    #[test]
    fn progress_stays_within_work_intervals(
        intervals in 1u32..=10,
        autostart in any::<bool>(),
        ops in prop::collection::vec(op(), 0..60),
    ) {
        let mut engine = TimerEngine::new(short_config(intervals, autostart));
        for op in &ops {
            apply(&mut engine, op);
            let limit = f64::from(engine.durations().work_intervals);
            let progress = engine.session_progress().value();
            prop_assert!((0.0..=limit).contains(&progress), "{progress} > {limit} after {op:?}");
        }
    }

    #[test]
    fn nothing_state_means_nothing_armed(
        ops in prop::collection::vec(op(), 0..60),
    ) {
        let mut engine = TimerEngine::new(short_config(4, true));
        for op in &ops {
            apply(&mut engine, op);
            if engine.state() == TimerState::Nothing {
                prop_assert!(engine.is_idle());
                prop_assert_eq!(engine.session_progress().halves(), 0);
            }
        }
    }

    #[test]
    fn stop_then_step_always_lands_on_first_work(
        ops in prop::collection::vec(op(), 0..60),
    ) {
        let mut engine = TimerEngine::new(short_config(3, false));
        for op in &ops {
            apply(&mut engine, op);
        }
        engine.stop_session();
        engine.update_session_progress();
        prop_assert_eq!(engine.state(), TimerState::Work);
        prop_assert_eq!(engine.session_progress().value(), 0.5);
    }

    #[test]
    fn second_pause_changes_nothing(ticks in 0u16..600) {
        let mut engine = TimerEngine::new(short_config(4, true));
        engine.start_session();
        for _ in 0..ticks {
            engine.tick();
        }
        engine.pause_duration();
        let remaining = engine.remaining_ms();
        prop_assert!(engine.pause_duration().is_empty());
        prop_assert_eq!(engine.remaining_ms(), remaining);
    }
}
