//! Error type shared by configuration loading and validation.

use std::io;
use thiserror::Error;

/// Errors raised while loading or validating a flow-control configuration.
///
/// The scheduling hot path never fails: requests are either executed, rejected or timed out,
/// and those outcomes are values, not errors.
#[derive(Debug, Error)]
pub enum FlowControlError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("server concurrency limit must be positive")]
    ZeroServerConcurrency,
    #[error("priority level {name:?}: {reason}")]
    InvalidPriorityLevel { name: String, reason: String },
    #[error("priority level {0:?} is defined more than once")]
    DuplicatePriorityLevel(String),
    #[error("flow schema {0:?} is defined more than once")]
    DuplicateFlowSchema(String),
}

impl FlowControlError {
    pub(crate) fn invalid_level(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPriorityLevel {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
