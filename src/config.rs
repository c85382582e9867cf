//! Serializable flow-control configuration.
//!
//! A configuration file is a JSON document:
//!
//! ```json
//! {
//!   "server_concurrency_limit": 600,
//!   "request_wait_limit": 15000,
//!   "estimated_service_time": 60000,
//!   "priority_levels": [
//!     { "name": "system-top", "exempt": true },
//!     { "name": "workload-low", "shares": 100, "global_default": true }
//!   ],
//!   "flow_schemas": [
//!     { "name": "service-accounts", "priority_level": "workload-low",
//!       "matching_precedence": 100, "groups": ["system:serviceaccounts"],
//!       "distinguisher": "by_namespace" }
//!   ]
//! }
//! ```
//!
//! Durations are given in milliseconds.

use crate::error::FlowControlError;
use crate::flow_schema::{DistinguisherMethod, FlowMatcher, FlowSchema, MatchAll, MatchSubjects};
use crate::priority::{PriorityLevelConfig, DEFAULT_EXEMPT_LEVEL, DEFAULT_GLOBAL_LEVEL};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Top-level configuration of a request management system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowControlConfig {
    /// Seats shared by all non-exempt priority levels.
    pub server_concurrency_limit: usize,
    #[serde(with = "duration_millis")]
    pub request_wait_limit: Duration,
    /// Service time estimate (G) used for virtual finish times.
    #[serde(with = "duration_millis")]
    pub estimated_service_time: Duration,
    pub priority_levels: Vec<PriorityLevelConfig>,
    pub flow_schemas: Vec<FlowSchemaConfig>,
}

impl Default for FlowControlConfig {
    fn default() -> Self {
        Self {
            server_concurrency_limit: 600,
            request_wait_limit: Duration::from_secs(15),
            estimated_service_time: Duration::from_secs(60),
            priority_levels: vec![
                PriorityLevelConfig::exempt(DEFAULT_EXEMPT_LEVEL),
                PriorityLevelConfig::new("workload-high")
                    .with_shares(40)
                    .with_queues(64, 6, 50),
                PriorityLevelConfig::global_default(DEFAULT_GLOBAL_LEVEL),
            ],
            flow_schemas: vec![FlowSchemaConfig {
                name: "service-accounts".to_string(),
                priority_level: "workload-high".to_string(),
                matching_precedence: 100,
                users: Vec::new(),
                groups: vec!["system:serviceaccounts".to_string()],
                distinguisher: Some(DistinguisherMethod::ByNamespace),
            }],
        }
    }
}

impl FlowControlConfig {
    pub fn from_json_str(json: &str) -> Result<Self, FlowControlError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FlowControlError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String, FlowControlError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), FlowControlError> {
        if self.server_concurrency_limit == 0 {
            return Err(FlowControlError::ZeroServerConcurrency);
        }
        let mut levels = HashSet::new();
        for level in &self.priority_levels {
            level.validate()?;
            if !levels.insert(level.name.as_str()) {
                return Err(FlowControlError::DuplicatePriorityLevel(level.name.clone()));
            }
        }
        let mut schemas = HashSet::new();
        for schema in &self.flow_schemas {
            if !schemas.insert(schema.name.as_str()) {
                return Err(FlowControlError::DuplicateFlowSchema(schema.name.clone()));
            }
        }
        Ok(())
    }

    /// Flow schemas ready to be digested.
    pub fn build_flow_schemas(&self) -> Vec<FlowSchema> {
        self.flow_schemas
            .iter()
            .map(FlowSchemaConfig::to_flow_schema)
            .collect()
    }
}

/// Serializable form of a [`FlowSchema`] matching on users and groups.
///
/// A schema with neither users nor groups matches every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSchemaConfig {
    pub name: String,
    pub priority_level: String,
    pub matching_precedence: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinguisher: Option<DistinguisherMethod>,
}

impl FlowSchemaConfig {
    pub fn to_flow_schema(&self) -> FlowSchema {
        let matcher: Arc<dyn FlowMatcher> = if self.users.is_empty() && self.groups.is_empty() {
            Arc::new(MatchAll)
        } else {
            Arc::new(MatchSubjects {
                users: self.users.clone(),
                groups: self.groups.clone(),
            })
        };
        FlowSchema {
            name: self.name.clone(),
            priority_level: self.priority_level.clone(),
            matching_precedence: self.matching_precedence,
            matcher,
            distinguisher: self.distinguisher,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
