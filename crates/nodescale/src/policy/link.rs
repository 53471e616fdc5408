use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, SystemTime};

use crate::common::error::ScaleError;
use crate::common::{JobId, Map};
use crate::policy::registry::{NodeId, NodeState};

pub type LinkResult<T> = anyhow::Result<T>;
pub type LinkFuture<T> = Pin<Box<dyn Future<Output = LinkResult<T>>>>;

/// Per-node results of a batched state query. A failed entry means that the node's state is unknown.
pub type NodeStateMap = Map<NodeId, LinkResult<NodeState>>;

/// Amount of work reported by the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadSignal {
    pub running_task_count: u32,
    pub nodes_needed_by_queued_tasks: u32,
}

impl WorkloadSignal {
    pub fn total(&self) -> u32 {
        self.running_task_count
            .saturating_add(self.nodes_needed_by_queued_tasks)
    }
}

/// A node present in the node source at the time of activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub node: NodeId,
    pub state: NodeState,
    pub acquired_at: SystemTime,
}

impl NodeSnapshot {
    pub fn new(node: impl Into<NodeId>, state: NodeState, acquired_at: SystemTime) -> Self {
        Self {
            node: node.into(),
            state,
            acquired_at,
        }
    }
}

/// Connection to the scheduler and to the node source managed by the policy.
pub trait NodeSourceLink {
    /// Name of the node source. Node events of other sources are ignored.
    fn source_name(&self) -> &str;

    fn workload_signal(&self) -> LinkFuture<WorkloadSignal>;

    /// Queries the states of a set of nodes at once.
    fn node_states(&self, nodes: &[NodeId]) -> LinkFuture<NodeStateMap>;

    /// Number of alive nodes of the node source known to the resource manager.
    fn alive_node_count(&self) -> LinkFuture<u32>;

    fn nodes_in_source(&self) -> LinkFuture<Vec<NodeSnapshot>>;

    /// Unfinished jobs known to the scheduler, with the number of nodes each of them still needs.
    fn jobs_in_scheduler(&self) -> LinkFuture<Map<JobId, u32>>;

    /// Asks the node source to acquire `count` new nodes. The outcome is reported by node events.
    fn request_acquire(&mut self, count: u32);

    /// Asks the node source to release a node. The outcome is reported by node events.
    fn request_release(&mut self, node: &NodeId, preemptive: bool);
}

/// Creates links, possibly failing when the scheduler is not reachable.
pub trait LinkConnector {
    fn connect(&self) -> LinkFuture<Box<dyn NodeSourceLink>>;
}

/// Tries to connect at most `trials` times, waiting `backoff` between two attempts.
pub async fn connect_with_retry(
    connector: &dyn LinkConnector,
    trials: u32,
    backoff: Duration,
) -> crate::Result<Box<dyn NodeSourceLink>> {
    let mut last_error = None;
    for attempt in 1..=trials {
        match connector.connect().await {
            Ok(link) => {
                log::debug!("Connected to the scheduler at attempt {attempt}");
                return Ok(link);
            }
            Err(error) => {
                log::warn!("Connection attempt {attempt}/{trials} to the scheduler failed: {error:?}");
                last_error = Some(error);
                if attempt < trials {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    Err(ScaleError::ConnectionExhausted {
        trials,
        reason: last_error
            .map(|error| error.to_string())
            .unwrap_or_else(|| "no connection attempt was made".to_string()),
    })
}
