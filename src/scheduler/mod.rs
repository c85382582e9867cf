//! Fair-queuing core: shuffle sharding, queue sets and their factory.

pub mod factory;
pub mod queue_set;
pub mod shuffle_shard;

pub use factory::{QueueSetFactory, DEFAULT_ESTIMATED_SERVICE_TIME};
pub use queue_set::{
    AfterExecution, Admission, Decision, Outcome, QueueSet, QueueSetConfig, QueueSetSnapshot,
    Ticket,
};
