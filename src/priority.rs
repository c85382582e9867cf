//! Priority level definitions and the per-level runtime state.

use crate::empty_handler::EmptyRelay;
use crate::error::FlowControlError;
use crate::scheduler::QueueSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Name given to a synthesized exempt level when none is configured.
pub const DEFAULT_EXEMPT_LEVEL: &str = "system-top";
/// Name given to a synthesized global-default level when none is configured.
pub const DEFAULT_GLOBAL_LEVEL: &str = "workload-low";

/// Configuration of one priority level.
///
/// Exempt levels bypass queuing entirely and ignore every other field. For the others,
/// `shares` decides the level's slice of the server-wide concurrency limit and the queue
/// fields shape its [`QueueSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityLevelConfig {
    pub name: String,
    /// Assured concurrency shares.
    #[serde(default = "default_shares")]
    pub shares: u32,
    #[serde(default = "default_queues")]
    pub queues: usize,
    #[serde(default = "default_queue_length_limit")]
    pub queue_length_limit: usize,
    #[serde(default = "default_hand_size")]
    pub hand_size: usize,
    #[serde(default)]
    pub exempt: bool,
    /// Requests matching no flow schema land here.
    #[serde(default)]
    pub global_default: bool,
}

fn default_shares() -> u32 {
    100
}

fn default_queues() -> usize {
    128
}

fn default_queue_length_limit() -> usize {
    100
}

fn default_hand_size() -> usize {
    6
}

impl PriorityLevelConfig {
    /// A queued level with default shares and queue shape.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shares: default_shares(),
            queues: default_queues(),
            queue_length_limit: default_queue_length_limit(),
            hand_size: default_hand_size(),
            exempt: false,
            global_default: false,
        }
    }

    /// A level whose requests execute without queuing.
    pub fn exempt(name: impl Into<String>) -> Self {
        Self {
            exempt: true,
            shares: 0,
            ..Self::new(name)
        }
    }

    /// The level unmatched requests fall back to.
    pub fn global_default(name: impl Into<String>) -> Self {
        Self {
            global_default: true,
            ..Self::new(name)
        }
    }

    pub fn with_shares(mut self, shares: u32) -> Self {
        self.shares = shares;
        self
    }

    pub fn with_queues(mut self, queues: usize, hand_size: usize, queue_length_limit: usize) -> Self {
        self.queues = queues;
        self.hand_size = hand_size;
        self.queue_length_limit = queue_length_limit;
        self
    }

    pub fn validate(&self) -> Result<(), FlowControlError> {
        if self.exempt {
            return Ok(());
        }
        if self.shares == 0 {
            return Err(FlowControlError::invalid_level(&self.name, "shares must be positive"));
        }
        if self.queues == 0 {
            return Err(FlowControlError::invalid_level(&self.name, "needs at least one queue"));
        }
        if self.hand_size == 0 {
            return Err(FlowControlError::invalid_level(&self.name, "hand size must be positive"));
        }
        if self.hand_size > self.queues {
            return Err(FlowControlError::invalid_level(
                &self.name,
                format!("hand size {} exceeds {} queues", self.hand_size, self.queues),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for PriorityLevelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exempt {
            write!(f, "{} (exempt)", self.name)
        } else {
            write!(
                f,
                "{} (shares={}, queues={}, hand={}, queue_length_limit={})",
                self.name, self.shares, self.queues, self.hand_size, self.queue_length_limit
            )
        }
    }
}

/// Concurrency limit of a level holding `shares` out of `total_shares`.
///
/// Rounds up, so every level with shares gets at least one seat. Returns 0 when there are no
/// shares at all.
pub fn concurrency_share(server_limit: usize, shares: u32, total_shares: u64) -> usize {
    if total_shares == 0 {
        return 0;
    }
    let seats = server_limit as u128 * u128::from(shares);
    seats.div_ceil(u128::from(total_shares)) as usize
}

/// Runtime state of one priority level inside a published snapshot.
///
/// Cloning shares the queue set and the relay; the coordinator builds each new snapshot from
/// clones of the previous one.
#[derive(Debug, Clone)]
pub struct PriorityLevelState {
    pub(crate) config: PriorityLevelConfig,
    pub(crate) concurrency_limit: usize,
    pub(crate) queues: Option<QueueSet>,
    /// Present while the level is no longer configured and waits to drain.
    pub(crate) empty_relay: Option<Arc<EmptyRelay>>,
}

impl PriorityLevelState {
    pub(crate) fn new(config: PriorityLevelConfig) -> Self {
        Self {
            config,
            concurrency_limit: 0,
            queues: None,
            empty_relay: None,
        }
    }

    pub fn config(&self) -> &PriorityLevelConfig {
        &self.config
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    pub fn queue_set(&self) -> Option<&QueueSet> {
        self.queues.as_ref()
    }

    /// Whether the level is part of the current configuration.
    pub fn is_desired(&self) -> bool {
        self.empty_relay.is_none()
    }
}
