use std::fmt::{Display, Formatter};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::common::{JobId, Map};
use crate::policy::accountant::{PoolAccountant, PoolCounters};
use crate::policy::config::{PolicyConfig, WorkloadSource};
use crate::policy::link::{NodeSnapshot, NodeSourceLink};
use crate::policy::registry::{NodeId, NodeState};
use crate::policy::removal::{RemovalSelector, create_selector};
use crate::policy::sampler::WindowedLoadSampler;
use crate::policy::service::PoolEvent;
use crate::policy::workload::WorkloadTracker;

pub const POLICY_DESCRIPTION: &str = "Acquires as many nodes as the scheduler requires according to \
the load factor and releases idle nodes smoothly";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleDecision {
    Acquire(u32),
    Release(u32),
    NoChange,
}

impl Display for ScaleDecision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleDecision::Acquire(count) => write!(f, "acquire {count} node(s)"),
            ScaleDecision::Release(count) => write!(f, "release {count} node(s)"),
            ScaleDecision::NoChange => f.write_str("no change"),
        }
    }
}

/// Number of nodes needed to process `load` tasks.
pub fn required_nodes(load: u32, load_factor: u32) -> u32 {
    load.div_ceil(load_factor.max(1))
}

/// Keeps the pool within its configured bounds. Returns `None` if the pool is within them.
pub fn decide_bounds(in_source: u32, config: &PolicyConfig) -> Option<ScaleDecision> {
    if in_source < config.min_nodes() {
        Some(ScaleDecision::Acquire(config.min_nodes() - in_source))
    } else if in_source > config.max_nodes() {
        Some(ScaleDecision::Release(in_source - config.max_nodes()))
    } else {
        None
    }
}

/// Follows the required number of nodes, without ever acquiring and releasing at once.
pub fn decide_for_load(
    in_source: u32,
    alive: u32,
    required: u32,
    config: &PolicyConfig,
) -> ScaleDecision {
    let in_source = in_source as i64;
    let alive = alive as i64;
    let required = required as i64;
    let min = config.min_nodes() as i64;
    let max = config.max_nodes() as i64;

    let to_add = (max - in_source).min(required - alive);
    if to_add > 0 {
        let count = required.min(max) - in_source;
        return if count > 0 {
            ScaleDecision::Acquire(count as u32)
        } else {
            ScaleDecision::NoChange
        };
    }
    let to_remove = (in_source - min).min(alive - required);
    if to_remove > 0 {
        ScaleDecision::Release(to_remove as u32)
    } else {
        ScaleDecision::NoChange
    }
}

/// Complete decision for known inputs.
pub fn decide(in_source: u32, alive: u32, required: u32, config: &PolicyConfig) -> ScaleDecision {
    decide_bounds(in_source, config)
        .unwrap_or_else(|| decide_for_load(in_source, alive, required, config))
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Sampling,
    Deciding,
    Acquiring,
    Releasing,
    NoOp,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PolicyStatus {
    pub counters: PoolCounters,
    pub estimate_in_source: u32,
    pub registered_nodes: usize,
    pub down_nodes: usize,
    pub considered_load: u32,
    pub tracked_jobs: usize,
    pub tracked_node_demand: u32,
    pub gate: String,
    pub cycles: u64,
    pub last_decision: Option<ScaleDecision>,
}

impl Display for PolicyStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "nodes: {} (confirmed {}, adding {}, removing {}), registered: {}, down: {}, load: {}, \
             jobs: {} needing {} node(s), gate: {}, cycles: {}, last decision: {}",
            self.estimate_in_source,
            self.counters.confirmed_in_source,
            self.counters.pending_add,
            self.counters.pending_remove,
            self.registered_nodes,
            self.down_nodes,
            self.considered_load,
            self.tracked_jobs,
            self.tracked_node_demand,
            self.gate,
            self.cycles,
            match self.last_decision {
                Some(decision) => decision.to_string(),
                None => "none".to_string(),
            }
        )
    }
}

/// Owns the whole state of a policy and runs its control cycle.
pub struct AutoscaleController {
    config: PolicyConfig,
    sampler: WindowedLoadSampler,
    accountant: PoolAccountant,
    selector: Box<dyn RemovalSelector>,
    workload: WorkloadTracker,
    phase: CyclePhase,
    cycles: u64,
    last_decision: Option<ScaleDecision>,
}

impl AutoscaleController {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            sampler: WindowedLoadSampler::new(config.window_size()),
            selector: create_selector(&config),
            accountant: PoolAccountant::default(),
            workload: WorkloadTracker::default(),
            phase: CyclePhase::Idle,
            cycles: 0,
            last_decision: None,
            config,
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn accountant(&self) -> &PoolAccountant {
        &self.accountant
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn seed(&mut self, nodes: Vec<NodeSnapshot>) {
        self.accountant.seed(nodes);
    }

    pub fn seed_jobs(&mut self, jobs: Map<JobId, u32>) {
        self.workload.seed(jobs);
    }

    pub fn status(&self, gate: String) -> PolicyStatus {
        PolicyStatus {
            counters: self.accountant.counters(),
            estimate_in_source: self.accountant.estimate_in_source(),
            registered_nodes: self.accountant.registry().len(),
            down_nodes: self.accountant.down_count(),
            considered_load: self.sampler.considered_load(),
            tracked_jobs: self.workload.job_count(),
            tracked_node_demand: self.workload.nodes_needed(),
            gate,
            cycles: self.cycles,
            last_decision: self.last_decision,
        }
    }

    fn enter(&mut self, phase: CyclePhase) {
        log::trace!("Cycle phase {:?} -> {phase:?}", self.phase);
        self.phase = phase;
    }

    /// Updates the bookkeeping with an event observed in the resource manager.
    pub fn on_event(&mut self, event: PoolEvent, source_name: &str) {
        if let Some(source) = event.node_source() {
            if source != source_name {
                log::trace!("Ignoring event of node source {source}");
                return;
            }
        }
        match event {
            PoolEvent::NodeAdded {
                node, state, at, ..
            } => {
                self.accountant.on_node_added(node, state, at);
            }
            PoolEvent::NodeRemoved { node, state, .. } => {
                self.accountant.on_node_removed(&node, state);
            }
            PoolEvent::NodeStateChanged {
                node,
                previous,
                state,
                ..
            } => {
                self.accountant.on_node_state_changed(&node, previous, state);
            }
            PoolEvent::JobSubmitted { job, nodes_needed } => {
                self.workload.on_job_submitted(job, nodes_needed);
            }
            PoolEvent::TaskFinished { job, nodes } => {
                self.workload.on_task_finished(job, nodes);
            }
            PoolEvent::JobUpdated { job, nodes_needed } => {
                self.workload.on_job_updated(job, nodes_needed);
            }
            PoolEvent::JobFinished { job } => {
                self.workload.on_job_finished(job);
            }
        }
    }

    /// Runs a single control cycle.
    pub async fn run_cycle(&mut self, link: &mut dyn NodeSourceLink) -> ScaleDecision {
        self.cycles += 1;

        self.enter(CyclePhase::Sampling);
        let sample = self.sample_workload(&*link).await;
        self.sampler.record(sample);
        let load = self.sampler.considered_load();
        let required = required_nodes(load, self.config.load_factor());

        self.enter(CyclePhase::Deciding);
        let in_source = self.accountant.estimate_in_source();
        let decision = match decide_bounds(in_source, &self.config) {
            Some(decision) => decision,
            None => match link.alive_node_count().await {
                Ok(alive) => {
                    let alive = self.accountant.estimate_alive(alive);
                    decide_for_load(in_source, alive, required, &self.config)
                }
                Err(error) => {
                    log::warn!("Could not get the number of alive nodes, skipping cycle: {error:?}");
                    self.enter(CyclePhase::Idle);
                    return ScaleDecision::NoChange;
                }
            },
        };
        log::debug!(
            "Cycle {}: sample {sample}, load {load}, required {required}, in source {in_source}, decision: {decision}",
            self.cycles
        );

        match decision {
            ScaleDecision::Acquire(count) => self.acquire(count, link),
            ScaleDecision::Release(count) => self.release(count, link).await,
            ScaleDecision::NoChange => self.enter(CyclePhase::NoOp),
        }
        self.last_decision = Some(decision);
        self.enter(CyclePhase::Idle);
        decision
    }

    async fn sample_workload(&self, link: &dyn NodeSourceLink) -> u32 {
        match self.config.workload_source() {
            WorkloadSource::Events => self.workload.nodes_needed(),
            WorkloadSource::Query => match link.workload_signal().await {
                Ok(signal) => signal.total(),
                Err(error) => {
                    log::warn!("Could not get the workload from the scheduler, using 0: {error:?}");
                    0
                }
            },
        }
    }

    fn acquire(&mut self, count: u32, link: &mut dyn NodeSourceLink) {
        self.enter(CyclePhase::Acquiring);
        log::info!("Requesting {count} new node(s)");
        self.accountant.begin_add(count);
        link.request_acquire(count);
    }

    async fn release(&mut self, count: u32, link: &mut dyn NodeSourceLink) {
        self.enter(CyclePhase::Releasing);
        self.accountant.begin_remove(count);
        let states = self.query_states(&*link).await;
        let now = SystemTime::now();

        let mut remaining = count;
        while remaining > 0 {
            let pick = self.selector.select(
                self.accountant.registry_mut(),
                &|node| states.get(node).copied(),
                now,
            );
            let Some(pick) = pick else {
                break;
            };
            if pick.counts {
                remaining -= 1;
            }
            self.release_node(pick.node, Some(pick.state), pick.counts, link);
        }
        if remaining > 0 {
            log::debug!("No removal candidate for {remaining} node(s), cancelling their removal");
            self.accountant.cancel_remove(remaining);
        }
    }

    fn release_node(
        &mut self,
        node: NodeId,
        state: Option<NodeState>,
        reserved: bool,
        link: &mut dyn NodeSourceLink,
    ) {
        match state {
            Some(state) => log::info!("Releasing node {node} ({state})"),
            None => log::info!("Releasing node {node}"),
        }
        link.request_release(&node, self.config.preemptive_release());
        self.accountant.on_release_requested(node, reserved);
    }

    /// Last known states of all registered nodes. Nodes whose state is unknown are missing.
    async fn query_states(&self, link: &dyn NodeSourceLink) -> Map<NodeId, NodeState> {
        let nodes = self.accountant.registry().node_ids();
        if nodes.is_empty() {
            return Map::new();
        }
        match link.node_states(&nodes).await {
            Ok(states) => states
                .iter()
                .filter_map(|(node, state)| match state {
                    Ok(state) => Some((node.clone(), *state)),
                    Err(error) => {
                        log::warn!("Could not get the state of node {node}: {error:?}");
                        None
                    }
                })
                .collect(),
            Err(error) => {
                log::warn!("Could not get the states of nodes: {error:?}");
                Map::new()
            }
        }
    }

    /// Releases every registered node, ignoring the minimal size of the pool.
    pub async fn release_all(&mut self, link: &mut dyn NodeSourceLink) {
        if self.accountant.registry().is_empty() {
            log::debug!("There are no nodes to release");
            return;
        }
        self.enter(CyclePhase::Releasing);
        let states = self.query_states(&*link).await;
        let nodes = self.accountant.registry_mut().drain();
        let mut reserved = 0;
        for node in nodes {
            let state = states.get(&node).copied();
            let failed =
                self.accountant.is_down(&node) || state.is_some_and(|state| state.is_failed());
            if !failed {
                reserved += 1;
            }
            self.release_node(node, state, !failed, link);
        }
        self.accountant.begin_remove(reserved);
        log::info!("Released the whole pool ({reserved} usable node(s))");
        self.last_decision = Some(ScaleDecision::Release(reserved));
        self.enter(CyclePhase::Idle);
    }

    /// Acquires nodes until the pool reaches its maximal size.
    pub fn fill_to_max(&mut self, link: &mut dyn NodeSourceLink) {
        let in_source = self.accountant.estimate_in_source();
        let max = self.config.max_nodes();
        let decision = if in_source < max {
            self.acquire(max - in_source, link);
            ScaleDecision::Acquire(max - in_source)
        } else {
            ScaleDecision::NoChange
        };
        self.last_decision = Some(decision);
        self.enter(CyclePhase::Idle);
    }
}
