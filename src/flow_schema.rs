//! Flow schemas: which priority level a request belongs to and which flow inside it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Group every cluster administrator belongs to.
pub const GROUP_MASTERS: &str = "system:masters";
pub const GROUP_AUTHENTICATED: &str = "system:authenticated";
pub const GROUP_UNAUTHENTICATED: &str = "system:unauthenticated";

/// The parts of a request that classification looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDigest {
    pub user: String,
    pub groups: Vec<String>,
    pub namespace: Option<String>,
}

impl RequestDigest {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// Predicate deciding whether a flow schema applies to a request.
pub trait FlowMatcher: Send + Sync + fmt::Debug {
    fn matches(&self, request: &RequestDigest) -> bool;

    /// Whether every member of `group` is matched. Used to decide if catch-all schemas for the
    /// well-known groups are needed.
    fn covers_group(&self, _group: &str) -> bool {
        false
    }
}

/// Matches every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl FlowMatcher for MatchAll {
    fn matches(&self, _request: &RequestDigest) -> bool {
        true
    }

    fn covers_group(&self, _group: &str) -> bool {
        true
    }
}

/// Matches requests from any listed user or any member of a listed group.
#[derive(Debug, Clone, Default)]
pub struct MatchSubjects {
    pub users: Vec<String>,
    pub groups: Vec<String>,
}

impl MatchSubjects {
    pub fn groups<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: Vec::new(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}

impl FlowMatcher for MatchSubjects {
    fn matches(&self, request: &RequestDigest) -> bool {
        self.users.iter().any(|u| *u == request.user)
            || self.groups.iter().any(|g| request.in_group(g))
    }

    fn covers_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// How requests matched by one schema are split into flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistinguisherMethod {
    ByUser,
    ByNamespace,
}

impl DistinguisherMethod {
    pub fn distinguisher<'a>(&self, request: &'a RequestDigest) -> &'a str {
        match self {
            DistinguisherMethod::ByUser => &request.user,
            DistinguisherMethod::ByNamespace => request.namespace.as_deref().unwrap_or(""),
        }
    }
}

/// Routes matching requests to a priority level.
///
/// Schemas are tried in ascending `matching_precedence`; the first match wins.
#[derive(Debug, Clone)]
pub struct FlowSchema {
    pub name: String,
    pub priority_level: String,
    pub matching_precedence: u32,
    pub matcher: Arc<dyn FlowMatcher>,
    pub distinguisher: Option<DistinguisherMethod>,
}

impl FlowSchema {
    pub fn new(
        name: impl Into<String>,
        priority_level: impl Into<String>,
        matching_precedence: u32,
        matcher: Arc<dyn FlowMatcher>,
    ) -> Self {
        Self {
            name: name.into(),
            priority_level: priority_level.into(),
            matching_precedence,
            matcher,
            distinguisher: None,
        }
    }

    pub fn with_distinguisher(mut self, method: DistinguisherMethod) -> Self {
        self.distinguisher = Some(method);
        self
    }

    pub fn matches(&self, request: &RequestDigest) -> bool {
        self.matcher.matches(request)
    }

    /// Flow distinguisher for `request`; empty when the schema does not split flows.
    pub fn flow_distinguisher<'a>(&self, request: &'a RequestDigest) -> &'a str {
        self.distinguisher
            .map_or("", |method| method.distinguisher(request))
    }

    /// Flow hash for `request` under this schema.
    pub fn flow_hash(&self, request: &RequestDigest) -> u64 {
        hash_flow_id(&self.name, self.flow_distinguisher(request))
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(mut hash: u64, bytes: &[u8]) -> u64 {
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// 64-bit FNV-1a of `"<schema>,<distinguisher>"`.
pub fn hash_flow_id(schema: &str, distinguisher: &str) -> u64 {
    let hash = fnv1a(FNV_OFFSET_BASIS, schema.as_bytes());
    let hash = fnv1a(hash, b",");
    fnv1a(hash, distinguisher.as_bytes())
}
