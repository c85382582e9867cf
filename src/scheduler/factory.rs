//! Construction of queue sets that share a clock and a service time estimate.

use crate::clock::{Clock, RealClock};
use crate::scheduler::queue_set::{QueueSet, QueueSetConfig};
use std::sync::Arc;
use std::time::Duration;

/// Default estimate of how long one request occupies a seat (G).
pub const DEFAULT_ESTIMATED_SERVICE_TIME: Duration = Duration::from_secs(60);

/// Builds [`QueueSet`]s bound to a common [`Clock`].
///
/// The coordinator owns one factory and uses it for every priority level it creates, so a
/// simulation only has to swap the clock here.
#[derive(Clone)]
pub struct QueueSetFactory {
    clock: Arc<dyn Clock>,
    estimated_service_time: Duration,
}

impl QueueSetFactory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            estimated_service_time: DEFAULT_ESTIMATED_SERVICE_TIME,
        }
    }

    /// Override the service time estimate used for virtual finish times.
    pub fn with_estimated_service_time(mut self, estimated_service_time: Duration) -> Self {
        self.estimated_service_time = estimated_service_time;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn estimated_service_time(&self) -> Duration {
        self.estimated_service_time
    }

    pub fn new_queue_set(&self, name: impl Into<String>, config: QueueSetConfig) -> QueueSet {
        QueueSet::new(name, config, self.clock.clone(), self.estimated_service_time)
    }
}

impl Default for QueueSetFactory {
    fn default() -> Self {
        Self::new(Arc::new(RealClock))
    }
}

impl std::fmt::Debug for QueueSetFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSetFactory")
            .field("estimated_service_time", &self.estimated_service_time)
            .finish_non_exhaustive()
    }
}
