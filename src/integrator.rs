//! Time-weighted average of a piecewise-constant value.
//!
//! Used to measure how many requests of a flow were executing on average over a run, which is
//! what fairness is judged on.

use crate::clock::Clock;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Summary produced by [`Integrator::results`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntegratorResults {
    #[serde(rename = "duration_secs", serialize_with = "as_secs")]
    pub duration: Duration,
    pub average: f64,
}

fn as_secs<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

struct IntegratorState {
    start: Instant,
    last_change: Instant,
    value: f64,
    integral: f64,
}

impl IntegratorState {
    fn advance(&mut self, now: Instant) {
        if now > self.last_change {
            let elapsed = now.duration_since(self.last_change).as_secs_f64();
            self.integral += self.value * elapsed;
            self.last_change = now;
        }
    }
}

/// Integrates a step function over the time of its [`Clock`].
pub struct Integrator {
    clock: Arc<dyn Clock>,
    state: Mutex<IntegratorState>,
}

impl Integrator {
    /// Start integrating a value of zero from the clock's current time.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            clock,
            state: Mutex::new(IntegratorState {
                start: now,
                last_change: now,
                value: 0.0,
                integral: 0.0,
            }),
        }
    }

    pub fn add(&self, delta: f64) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.advance(now);
        state.value += delta;
    }

    pub fn set(&self, value: f64) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.advance(now);
        state.value = value;
    }

    pub fn value(&self) -> f64 {
        self.state.lock().value
    }

    /// Average since creation, up to the clock's current time.
    ///
    /// Before any time has passed the average is the current value.
    pub fn results(&self) -> IntegratorResults {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.advance(now);
        let duration = state.last_change.saturating_duration_since(state.start);
        let average = if duration.is_zero() {
            state.value
        } else {
            state.integral / duration.as_secs_f64()
        };
        IntegratorResults { duration, average }
    }
}
