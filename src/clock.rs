//! Time sources used by the queue sets.
//!
//! Every timestamp the scheduler records (enqueue, dispatch, virtual-time sync) comes from a
//! [`Clock`] so that simulations can drive the whole engine with a [`FakeClock`] and get
//! deterministic results.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of monotonic timestamps.
pub trait Clock: Send + Sync {
    /// Current instant according to this clock.
    fn now(&self) -> Instant;

    /// Time elapsed since `earlier`, saturating at zero.
    fn since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually driven clock for deterministic tests and simulations.
///
/// Clones share the same underlying time, so a test can hand one clone to a
/// [`QueueSetFactory`](crate::scheduler::QueueSetFactory) and keep another to advance it.
#[derive(Debug, Clone)]
pub struct FakeClock {
    current: Arc<Mutex<Instant>>,
}

impl FakeClock {
    /// Start the fake clock at `start`.
    pub fn new(start: Instant) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Move time forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut current = self.current.lock();
        *current += delta;
    }

    /// Jump to `instant`. Moving backwards is ignored so the clock stays monotonic.
    pub fn set(&self, instant: Instant) {
        let mut current = self.current.lock();
        if instant > *current {
            *current = instant;
        }
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }
}
