//! Fair-queuing admission control.
//!
//! Requests are classified by flow schemas into priority levels. Exempt levels run right away;
//! every other level owns a [`QueueSet`] that shuffle-shards flows onto queues and dispatches
//! them by virtual finish time within the level's share of the server concurrency limit.

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod empty_handler;
pub mod error;
pub mod flow_schema;
pub mod integrator;
pub mod packet;
pub mod priority;
pub mod queue;
pub mod scheduler;

// Re-export for easier testing
pub use clock::{Clock, FakeClock, RealClock};
pub use config::{FlowControlConfig, FlowSchemaConfig};
pub use coordinator::{RequestManagementState, RequestManagementSystem};
pub use empty_handler::{EmptyHandler, EmptyRelay};
pub use error::FlowControlError;
pub use flow_schema::{hash_flow_id, DistinguisherMethod, FlowSchema, RequestDigest};
pub use integrator::Integrator;
pub use priority::{PriorityLevelConfig, PriorityLevelState};
pub use scheduler::{
    Admission, AfterExecution, Decision, Outcome, QueueSet, QueueSetConfig, QueueSetFactory,
    QueueSetSnapshot, Ticket,
};
