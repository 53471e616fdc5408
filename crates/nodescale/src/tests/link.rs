use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::common::{JobId, Map};
use crate::policy::link::{
    LinkConnector, LinkFuture, LinkResult, NodeSnapshot, NodeSourceLink, NodeStateMap,
    WorkloadSignal,
};
use crate::policy::registry::{NodeId, NodeState};

#[derive(Default)]
struct MockLinkState {
    /// `None` makes the query fail.
    workload: Option<WorkloadSignal>,
    alive: Option<u32>,
    states: Map<NodeId, NodeState>,
    state_query_fails: bool,
    snapshot: Vec<NodeSnapshot>,
    snapshot_fails: bool,
    /// `None` makes the query fail.
    jobs: Option<Map<JobId, u32>>,

    acquired: Vec<u32>,
    released: Vec<(NodeId, bool)>,
    alive_queries: u32,
}

/// In-memory node source. Clones share their state, so a test can keep a clone to inspect
/// the requests made through a link handed over to the policy.
#[derive(Clone)]
pub struct MockLink {
    source: String,
    state: Rc<RefCell<MockLinkState>>,
}

impl Default for MockLink {
    fn default() -> Self {
        Self {
            source: "default".to_string(),
            state: Rc::new(RefCell::new(MockLinkState {
                workload: Some(WorkloadSignal::default()),
                alive: Some(0),
                jobs: Some(Map::new()),
                ..Default::default()
            })),
        }
    }
}

impl MockLink {
    pub fn with_workload(self, running: u32, queued: u32) -> Self {
        self.set_workload(running, queued);
        self
    }

    pub fn with_workload_failure(self) -> Self {
        self.state.borrow_mut().workload = None;
        self
    }

    pub fn with_alive(self, count: u32) -> Self {
        self.set_alive(count);
        self
    }

    pub fn with_alive_failure(self) -> Self {
        self.state.borrow_mut().alive = None;
        self
    }

    pub fn with_state_query_failure(self) -> Self {
        self.state.borrow_mut().state_query_fails = true;
        self
    }

    pub fn with_snapshot(self, nodes: Vec<NodeSnapshot>) -> Self {
        {
            let mut state = self.state.borrow_mut();
            for node in &nodes {
                state.states.insert(node.node.clone(), node.state);
            }
            state.snapshot = nodes;
        }
        self
    }

    pub fn with_snapshot_failure(self) -> Self {
        self.state.borrow_mut().snapshot_fails = true;
        self
    }

    /// Unfinished jobs as pairs of job id and nodes needed.
    pub fn with_jobs(self, jobs: &[(u32, u32)]) -> Self {
        self.state.borrow_mut().jobs = Some(
            jobs.iter()
                .map(|(job, nodes)| (JobId::new(*job), *nodes))
                .collect(),
        );
        self
    }

    pub fn with_jobs_failure(self) -> Self {
        self.state.borrow_mut().jobs = None;
        self
    }

    pub fn set_node_state(&self, node: &str, state: NodeState) {
        self.state.borrow_mut().states.insert(node.to_string(), state);
    }

    pub fn set_workload(&self, running: u32, queued: u32) {
        self.state.borrow_mut().workload = Some(WorkloadSignal {
            running_task_count: running,
            nodes_needed_by_queued_tasks: queued,
        });
    }

    pub fn set_alive(&self, count: u32) {
        self.state.borrow_mut().alive = Some(count);
    }

    pub fn acquired(&self) -> Vec<u32> {
        self.state.borrow().acquired.clone()
    }

    /// Names of released nodes, in the order of the release requests.
    pub fn released(&self) -> Vec<NodeId> {
        self.state
            .borrow()
            .released
            .iter()
            .map(|(node, _)| node.clone())
            .collect()
    }

    pub fn preemptive_releases(&self) -> Vec<bool> {
        self.state
            .borrow()
            .released
            .iter()
            .map(|(_, preemptive)| *preemptive)
            .collect()
    }

    pub fn alive_queries(&self) -> u32 {
        self.state.borrow().alive_queries
    }
}

impl NodeSourceLink for MockLink {
    fn source_name(&self) -> &str {
        &self.source
    }

    fn workload_signal(&self) -> LinkFuture<WorkloadSignal> {
        let workload = self.state.borrow().workload;
        Box::pin(async move {
            workload.ok_or_else(|| anyhow::anyhow!("scheduler did not report the workload"))
        })
    }

    fn node_states(&self, nodes: &[NodeId]) -> LinkFuture<NodeStateMap> {
        let state = self.state.borrow();
        let result: LinkResult<NodeStateMap> = if state.state_query_fails {
            Err(anyhow::anyhow!("node states are not available"))
        } else {
            Ok(nodes
                .iter()
                .map(|node| {
                    let node_state = state
                        .states
                        .get(node)
                        .copied()
                        .ok_or_else(|| anyhow::anyhow!("unknown node {node}"));
                    (node.clone(), node_state)
                })
                .collect())
        };
        Box::pin(async move { result })
    }

    fn alive_node_count(&self) -> LinkFuture<u32> {
        let mut state = self.state.borrow_mut();
        state.alive_queries += 1;
        let alive = state.alive;
        Box::pin(async move { alive.ok_or_else(|| anyhow::anyhow!("alive count is not available")) })
    }

    fn nodes_in_source(&self) -> LinkFuture<Vec<NodeSnapshot>> {
        let state = self.state.borrow();
        let result = if state.snapshot_fails {
            Err(anyhow::anyhow!("node source is not available"))
        } else {
            Ok(state.snapshot.clone())
        };
        Box::pin(async move { result })
    }

    fn jobs_in_scheduler(&self) -> LinkFuture<Map<JobId, u32>> {
        let jobs = self.state.borrow().jobs.clone();
        Box::pin(async move { jobs.ok_or_else(|| anyhow::anyhow!("job list is not available")) })
    }

    fn request_acquire(&mut self, count: u32) {
        self.state.borrow_mut().acquired.push(count);
    }

    fn request_release(&mut self, node: &NodeId, preemptive: bool) {
        self.state
            .borrow_mut()
            .released
            .push((node.clone(), preemptive));
    }
}

/// Hands out clones of a single link, failing the first `failures` attempts.
pub struct MockConnector {
    link: MockLink,
    failures: u32,
    attempts: Cell<u32>,
}

impl MockConnector {
    pub fn new(link: MockLink) -> Self {
        Self {
            link,
            failures: 0,
            attempts: Cell::new(0),
        }
    }

    pub fn with_failures(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.get()
    }
}

impl LinkConnector for MockConnector {
    fn connect(&self) -> LinkFuture<Box<dyn NodeSourceLink>> {
        let attempt = self.attempts.get() + 1;
        self.attempts.set(attempt);
        let result = if attempt <= self.failures {
            Err(anyhow::anyhow!("scheduler is not reachable"))
        } else {
            Ok(Box::new(self.link.clone()) as Box<dyn NodeSourceLink>)
        };
        Box::pin(async move { result })
    }
}
