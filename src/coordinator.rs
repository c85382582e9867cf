//! Request management: classification, per-level queue sets and configuration digests.
//!
//! The coordinator publishes an immutable [`RequestManagementState`] through an `ArcSwap`.
//! Requests load the current snapshot without locking, pick a flow schema, and either execute
//! right away (exempt levels) or wait in the level's [`QueueSet`]. Configuration changes build a
//! fresh snapshot from the previous one and swap it in; a single writer lock serializes them.
//!
//! Algorithm (digest):
//! 1. Adopt every configured level, reusing the previous state (and queue set) of the same name
//! 2. Synthesize an exempt and a global-default level when the configuration lacks them
//! 3. Drop flow schemas naming unknown levels, then sort by matching precedence
//! 4. Append catch-all schemas for the well-known groups nobody covers
//! 5. Keep levels that left the configuration until their queue set drains
//! 6. Split the server concurrency limit by shares and (re)configure each queue set
//! 7. Publish the snapshot, then quiesce the levels that just left the configuration

use crate::clock::Clock;
use crate::config::FlowControlConfig;
use crate::empty_handler::{EmptyHandler, EmptyRelay};
use crate::error::FlowControlError;
use crate::flow_schema::{
    hash_flow_id, DistinguisherMethod, FlowSchema, MatchSubjects, RequestDigest,
    GROUP_AUTHENTICATED, GROUP_MASTERS, GROUP_UNAUTHENTICATED,
};
use crate::priority::{
    concurrency_share, PriorityLevelConfig, PriorityLevelState, DEFAULT_EXEMPT_LEVEL,
    DEFAULT_GLOBAL_LEVEL,
};
use crate::scheduler::{AfterExecution, Decision, Outcome, QueueSet, QueueSetConfig, QueueSetFactory};
use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Immutable view of all priority levels and the flow schemas routing to them.
#[derive(Debug, Default)]
pub struct RequestManagementState {
    flow_schemas: Vec<FlowSchema>,
    priority_levels: HashMap<String, PriorityLevelState>,
    default_level: String,
    exempt_level: String,
}

/// Where a request goes and which flow it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct Classification<'a> {
    pub flow_schema: &'a str,
    pub level_name: &'a str,
    pub level: &'a PriorityLevelState,
    pub flow_hash: u64,
}

impl RequestManagementState {
    /// Flow schemas in matching order.
    pub fn flow_schemas(&self) -> &[FlowSchema] {
        &self.flow_schemas
    }

    pub fn priority_level(&self, name: &str) -> Option<&PriorityLevelState> {
        self.priority_levels.get(name)
    }

    /// Names of all levels, desired or draining, sorted.
    pub fn level_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.priority_levels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn default_level(&self) -> &str {
        &self.default_level
    }

    pub fn exempt_level(&self) -> &str {
        &self.exempt_level
    }

    /// First schema, in matching order, that matches `request`.
    pub fn pick_flow_schema(&self, request: &RequestDigest) -> Option<&FlowSchema> {
        self.flow_schemas.iter().find(|schema| schema.matches(request))
    }

    /// Resolve `request` to its level and flow hash.
    ///
    /// Requests no schema matches go to the global-default level, flowed by user under the
    /// default level's name.
    pub fn classify(&self, request: &RequestDigest) -> Option<Classification<'_>> {
        let (flow_schema, level_name, flow_hash) = match self.pick_flow_schema(request) {
            Some(schema) => (
                schema.name.as_str(),
                schema.priority_level.as_str(),
                schema.flow_hash(request),
            ),
            None => {
                let default = self.default_level.as_str();
                let distinguisher = DistinguisherMethod::ByUser.distinguisher(request);
                (default, default, hash_flow_id(default, distinguisher))
            }
        };
        let level = self.priority_levels.get(level_name)?;
        Some(Classification {
            flow_schema,
            level_name,
            level,
            flow_hash,
        })
    }
}

/// Last configuration handed to [`RequestManagementSystem::digest_config_objects`].
struct AppliedConfig {
    levels: Vec<PriorityLevelConfig>,
    schemas: Vec<FlowSchema>,
}

/// Admission control front door.
pub struct RequestManagementSystem {
    factory: QueueSetFactory,
    server_concurrency_limit: usize,
    request_wait_limit: Duration,
    current: ArcSwap<RequestManagementState>,
    /// Serializes digests and remembers what was applied last, for resyncs.
    write_lock: Mutex<Option<AppliedConfig>>,
    resync_tx: Sender<()>,
    resync_rx: Receiver<()>,
}

impl RequestManagementSystem {
    /// A system with only the synthesized exempt and global-default levels.
    pub fn new(
        factory: QueueSetFactory,
        server_concurrency_limit: usize,
        request_wait_limit: Duration,
    ) -> Self {
        let system = Self::bare(factory, server_concurrency_limit, request_wait_limit);
        system.digest_config_objects(Vec::new(), Vec::new());
        system
    }

    /// A system running `config`, timed by `clock`.
    pub fn from_config(
        config: &FlowControlConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FlowControlError> {
        config.validate()?;
        let factory = QueueSetFactory::new(clock)
            .with_estimated_service_time(config.estimated_service_time);
        let system = Self::bare(
            factory,
            config.server_concurrency_limit,
            config.request_wait_limit,
        );
        system.digest_config_objects(config.priority_levels.clone(), config.build_flow_schemas());
        Ok(system)
    }

    fn bare(
        factory: QueueSetFactory,
        server_concurrency_limit: usize,
        request_wait_limit: Duration,
    ) -> Self {
        let (resync_tx, resync_rx) = bounded(1);
        Self {
            factory,
            server_concurrency_limit,
            request_wait_limit,
            current: ArcSwap::from_pointee(RequestManagementState::default()),
            write_lock: Mutex::new(None),
            resync_tx,
            resync_rx,
        }
    }

    /// The snapshot requests are currently classified against.
    pub fn current_state(&self) -> Arc<RequestManagementState> {
        self.current.load_full()
    }

    pub fn server_concurrency_limit(&self) -> usize {
        self.server_concurrency_limit
    }

    /// Notifications that a draining level has emptied and a [`resync`](Self::resync) is due.
    pub fn resync_receiver(&self) -> Receiver<()> {
        self.resync_rx.clone()
    }

    /// Replace the priority levels and flow schemas.
    ///
    /// Digesting the same objects twice yields the same levels, limits and queue sets.
    pub fn digest_config_objects(&self, levels: Vec<PriorityLevelConfig>, schemas: Vec<FlowSchema>) {
        let mut applied = self.write_lock.lock();
        self.digest_locked(&levels, &schemas);
        *applied = Some(AppliedConfig { levels, schemas });
    }

    /// Re-digest the last configuration so drained levels are dropped.
    pub fn resync(&self) {
        let applied = self.write_lock.lock();
        if let Some(applied) = applied.as_ref() {
            debug!("resyncing request management state");
            self.digest_locked(&applied.levels, &applied.schemas);
        }
    }

    /// Decide whether `request` may execute, blocking while it is queued.
    ///
    /// A request that reaches a level which started draining after the snapshot was loaded is
    /// re-classified against the newer snapshot.
    pub fn wait(&self, request: &RequestDigest) -> Decision {
        loop {
            let state = self.current.load_full();
            let Some(classification) = state.classify(request) else {
                warn!(user = %request.user, "request maps to no priority level, rejecting");
                return Decision::Rejected;
            };
            let level = classification.level;
            if level.config.exempt {
                trace!(user = %request.user, level = classification.level_name, "serving without delay");
                return Decision::Execute(AfterExecution::noop());
            }
            let Some(queues) = level.queue_set() else {
                warn!(level = classification.level_name, "priority level has no queue set, rejecting");
                return Decision::Rejected;
            };
            match queues.wait(classification.flow_hash, level.config.hand_size) {
                Outcome::Quiescent => {
                    debug!(
                        user = %request.user,
                        level = classification.level_name,
                        "request landed in a timing splinter, re-classifying"
                    );
                }
                Outcome::Decided(decision) => return decision,
            }
        }
    }

    fn digest_locked(&self, levels: &[PriorityLevelConfig], schemas: &[FlowSchema]) {
        let old = self.current.load_full();
        let mut new_levels: HashMap<String, PriorityLevelState> =
            HashMap::with_capacity(levels.len() + 2);
        let mut exempt_level = None;
        let mut default_level = None;

        for config in levels {
            if new_levels.contains_key(&config.name) {
                warn!(level = %config.name, "priority level configured twice, keeping the first");
                continue;
            }
            if config.exempt && exempt_level.is_none() {
                exempt_level = Some(config.name.clone());
            }
            if config.global_default && default_level.is_none() {
                default_level = Some(config.name.clone());
            }
            new_levels.insert(config.name.clone(), adopt_level(&old, config.clone()));
        }

        let exempt_level = exempt_level.unwrap_or_else(|| {
            synthesize_level(&old, &mut new_levels, DEFAULT_EXEMPT_LEVEL, |name| {
                PriorityLevelConfig::exempt(name)
            })
        });
        let default_level = default_level.unwrap_or_else(|| {
            synthesize_level(
                &old,
                &mut new_levels,
                DEFAULT_GLOBAL_LEVEL,
                |name| PriorityLevelConfig::global_default(name),
            )
        });

        let mut flow_schemas: Vec<FlowSchema> = schemas
            .iter()
            .filter(|schema| {
                if new_levels.contains_key(&schema.priority_level) {
                    return true;
                }
                let problem = if old.priority_levels.contains_key(&schema.priority_level) {
                    "undesired"
                } else {
                    "non-existent"
                };
                warn!(
                    flow_schema = %schema.name,
                    level = %schema.priority_level,
                    "ignoring flow schema that references {problem} priority level"
                );
                false
            })
            .cloned()
            .collect();
        flow_schemas.sort_by_key(|schema| schema.matching_precedence);

        let covered =
            |group: &str| flow_schemas.iter().any(|schema| schema.matcher.covers_group(group));
        let masters_covered = covered(GROUP_MASTERS);
        let everyone_covered = covered(GROUP_AUTHENTICATED) && covered(GROUP_UNAUTHENTICATED);
        if !masters_covered {
            flow_schemas.push(FlowSchema::new(
                exempt_level.clone(),
                exempt_level.clone(),
                u32::MAX,
                Arc::new(MatchSubjects::groups([GROUP_MASTERS])),
            ));
        }
        if !everyone_covered {
            flow_schemas.push(
                FlowSchema::new(
                    default_level.clone(),
                    default_level.clone(),
                    u32::MAX,
                    Arc::new(MatchSubjects::groups([GROUP_AUTHENTICATED, GROUP_UNAUTHENTICATED])),
                )
                .with_distinguisher(DistinguisherMethod::ByUser),
            );
        }

        let mut retiring: Vec<(QueueSet, Arc<EmptyRelay>)> = Vec::new();
        for (name, previous) in &old.priority_levels {
            if new_levels.contains_key(name) {
                continue;
            }
            let Some(queues) = previous.queues.clone() else {
                info!(level = %name, "priority level removed");
                continue;
            };
            match &previous.empty_relay {
                Some(relay) if relay.is_empty() => {
                    info!(level = %name, "drained priority level removed");
                }
                Some(_) => {
                    new_levels.insert(name.clone(), previous.clone());
                }
                None => {
                    info!(level = %name, "priority level no longer desired, draining");
                    let relay = Arc::new(EmptyRelay::new(self.resync_tx.clone()));
                    let mut state = previous.clone();
                    state.empty_relay = Some(relay.clone());
                    retiring.push((queues, relay));
                    new_levels.insert(name.clone(), state);
                }
            }
        }

        let share_sum: u64 = new_levels
            .values()
            .filter(|level| !level.config.exempt)
            .map(|level| u64::from(level.config.shares))
            .sum();
        for (name, level) in new_levels.iter_mut() {
            if level.config.exempt {
                continue;
            }
            level.concurrency_limit =
                concurrency_share(self.server_concurrency_limit, level.config.shares, share_sum);
            let config = QueueSetConfig {
                concurrency_limit: level.concurrency_limit,
                desired_num_queues: level.config.queues,
                queue_length_limit: level.config.queue_length_limit,
                request_wait_limit: self.request_wait_limit,
            };
            if let Some(queues) = &level.queues {
                queues.set_configuration(config);
            } else {
                level.queues = Some(self.factory.new_queue_set(name.clone(), config));
            }
            debug!(
                level = %name,
                concurrency_limit = level.concurrency_limit,
                share_sum,
                "configured priority level"
            );
        }

        self.current.store(Arc::new(RequestManagementState {
            flow_schemas,
            priority_levels: new_levels,
            default_level,
            exempt_level,
        }));

        for (queues, relay) in retiring {
            let handler: Arc<dyn EmptyHandler> = relay;
            queues.quiesce(Some(handler));
        }
    }
}

impl std::fmt::Debug for RequestManagementSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestManagementSystem")
            .field("server_concurrency_limit", &self.server_concurrency_limit)
            .field("request_wait_limit", &self.request_wait_limit)
            .field("state", &self.current.load_full())
            .finish_non_exhaustive()
    }
}

/// State for `config`, carried over from the previous snapshot when the level already existed.
fn adopt_level(old: &RequestManagementState, config: PriorityLevelConfig) -> PriorityLevelState {
    let Some(previous) = old.priority_levels.get(&config.name) else {
        info!(level = %config, "priority level created");
        return PriorityLevelState::new(config);
    };
    let mut state = previous.clone();
    if state.empty_relay.take().is_some() {
        info!(level = %config.name, "priority level desired again");
        if let Some(queues) = &state.queues {
            queues.quiesce(None);
        }
    }
    state.config = config;
    state
}

/// Add a level built by `make` under the first free name derived from `base`.
fn synthesize_level(
    old: &RequestManagementState,
    levels: &mut HashMap<String, PriorityLevelState>,
    base: &str,
    make: fn(String) -> PriorityLevelConfig,
) -> String {
    let name = (1..)
        .map(|n| if n == 1 { base.to_string() } else { format!("{base}-{n}") })
        .find(|candidate| !levels.contains_key(candidate))
        .unwrap_or_else(|| base.to_string());
    warn!(level = %name, "synthesizing missing priority level");
    levels.insert(name.clone(), adopt_level(old, make(name.clone())));
    name
}
