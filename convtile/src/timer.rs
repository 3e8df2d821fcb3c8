use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Instant;

#[derive(Debug, Default)]
struct TimerState {
    enabled: Vec<bool>,
    starts: Vec<Option<Instant>>,
    durations: Vec<u128>,
}

/// Wall-clock stopwatch per engine, addressed by `Engine::id`.
pub struct Timer;

impl Timer {
    fn state() -> &'static Mutex<TimerState> {
        static INSTANCE: OnceLock<Mutex<TimerState>> = OnceLock::new();
        INSTANCE.get_or_init(|| Mutex::new(TimerState::default()))
    }

    fn with_slot<R>(engine_id: u32, f: impl FnOnce(&mut TimerState, usize) -> R) -> R {
        let id = engine_id as usize;
        let mut state = Self::state()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.enabled.len() <= id {
            state.enabled.resize(id + 1, false);
            state.starts.resize_with(id + 1, || None);
            state.durations.resize(id + 1, 0);
        }
        f(&mut state, id)
    }

    pub fn set_enabled(engine_id: u32, enabled: bool) {
        Self::with_slot(engine_id, |state, id| {
            state.enabled[id] = enabled;
            if !enabled {
                state.starts[id] = None;
            }
        });
    }

    pub fn start(engine_id: u32) {
        Self::with_slot(engine_id, |state, id| {
            if state.enabled[id] {
                state.starts[id] = Some(Instant::now());
            }
        });
    }

    pub fn stop(engine_id: u32) {
        Self::with_slot(engine_id, |state, id| {
            if let Some(start) = state.starts[id].take() {
                state.durations[id] = start.elapsed().as_nanos();
            }
        });
    }

    /// Time since `start` without stopping the clock.
    pub fn lap(engine_id: u32) -> Option<u128> {
        Self::with_slot(engine_id, |state, id| {
            state.starts[id].map(|start| start.elapsed().as_nanos())
        })
    }

    /// Duration of the last completed start/stop pair.
    pub fn elapsed(engine_id: u32) -> Option<u128> {
        Self::with_slot(engine_id, |state, id| {
            state.enabled[id].then(|| state.durations[id])
        })
    }
}
