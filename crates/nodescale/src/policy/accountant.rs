use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::common::{Map, Set};
use crate::policy::link::NodeSnapshot;
use crate::policy::registry::{NodeId, NodeRegistry, NodeState};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolCounters {
    /// Usable nodes confirmed by the node source.
    pub confirmed_in_source: u32,
    /// Requested nodes that did not appear in the node source yet.
    pub pending_add: u32,
    /// Released nodes whose removal was not confirmed yet.
    pub pending_remove: u32,
}

/// Keeps the pool counters consistent with requests issued by the policy and with events
/// confirming (or failing) them.
#[derive(Default)]
pub struct PoolAccountant {
    counters: PoolCounters,
    registry: NodeRegistry,
    /// Registered nodes that went down and are not counted as confirmed.
    down_nodes: Set<NodeId>,
    /// Nodes released by the policy whose removal was not confirmed yet.
    /// The value says whether the release reserved a unit of `pending_remove`.
    releases: Map<NodeId, bool>,
}

impl PoolAccountant {
    pub fn counters(&self) -> PoolCounters {
        self.counters
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    pub fn is_down(&self, node: &str) -> bool {
        self.down_nodes.contains(node)
    }

    pub fn down_count(&self) -> usize {
        self.down_nodes.len()
    }

    /// Number of nodes that will be in the node source once all pending requests finish.
    pub fn estimate_in_source(&self) -> u32 {
        let PoolCounters {
            confirmed_in_source,
            pending_add,
            pending_remove,
        } = self.counters;
        let estimate = confirmed_in_source as i64 + pending_add as i64 - pending_remove as i64;
        if estimate < 0 {
            log::warn!(
                "Negative estimate of nodes in the node source ({estimate}), counters: {:?}",
                self.counters
            );
            0
        } else {
            estimate as u32
        }
    }

    /// Number of alive nodes once all pending requests finish.
    pub fn estimate_alive(&self, alive_in_cluster: u32) -> u32 {
        let estimate = alive_in_cluster as i64 + self.counters.pending_add as i64
            - self.counters.pending_remove as i64;
        estimate.max(0) as u32
    }

    pub fn begin_add(&mut self, count: u32) {
        self.counters.pending_add += count;
    }

    pub fn begin_remove(&mut self, count: u32) {
        self.counters.pending_remove += count;
    }

    /// Returns a part of a removal reservation that could not be used.
    pub fn cancel_remove(&mut self, count: u32) {
        self.counters.pending_remove = decrement(self.counters.pending_remove, count, "pending_remove");
    }

    /// Remembers that `node` was released by the policy.
    pub fn on_release_requested(&mut self, node: NodeId, reserved: bool) {
        self.releases.insert(node, reserved);
    }

    /// Registers nodes that were present in the node source before the policy was activated.
    pub fn seed(&mut self, nodes: Vec<NodeSnapshot>) {
        for NodeSnapshot {
            node,
            state,
            acquired_at,
        } in nodes
        {
            if !state.is_usable() {
                log::debug!("Not registering initial node {node} in state {state}");
                continue;
            }
            if self.registry.insert(node, acquired_at) {
                self.counters.confirmed_in_source += 1;
            }
        }
        log::debug!(
            "Seeded {} node(s) from the node source",
            self.counters.confirmed_in_source
        );
    }

    /// A node appeared in the node source.
    /// Returns `true` if the node was counted.
    pub fn on_node_added(&mut self, node: NodeId, state: NodeState, at: SystemTime) -> bool {
        if matches!(state, NodeState::Lost | NodeState::Deploying | NodeState::Down) {
            log::debug!("Ignoring addition of node {node} in state {state}");
            return false;
        }
        if self.registry.contains(&node) {
            log::warn!("Node {node} was added twice, ignoring");
            return false;
        }
        self.counters.confirmed_in_source += 1;
        self.counters.pending_add = decrement(self.counters.pending_add, 1, "pending_add");
        self.registry.insert(node, at);
        true
    }

    /// A node disappeared from the node source.
    pub fn on_node_removed(&mut self, node: &str, state: NodeState) {
        self.registry.remove(node);
        let was_down = self.down_nodes.remove(node);
        let release = self.releases.remove(node);

        if matches!(state, NodeState::Lost | NodeState::Deploying) {
            // The node was already discounted when it was lost, only a reserved release remains
            if release == Some(true) {
                self.counters.pending_remove =
                    decrement(self.counters.pending_remove, 1, "pending_remove");
            }
            log::debug!("Removal of node {node} in state {state}, counters: {:?}", self.counters);
            return;
        }
        if !was_down {
            self.counters.confirmed_in_source =
                decrement(self.counters.confirmed_in_source, 1, "confirmed_in_source");
        }
        let reserved = match release {
            Some(reserved) => reserved,
            // The node was not released by us, it still consumes one pending removal
            None => !was_down,
        };
        if reserved {
            self.counters.pending_remove = decrement(self.counters.pending_remove, 1, "pending_remove");
        }
    }

    fn is_tracked(&self, node: &str) -> bool {
        self.registry.contains(node) || self.releases.contains_key(node)
    }

    pub fn on_node_went_down(&mut self, node: &str) {
        if !self.is_tracked(node) {
            log::debug!("Unknown node {node} went down");
            return;
        }
        if !self.down_nodes.insert(node.to_string()) {
            return;
        }
        log::info!("Node {node} went down");
        self.counters.confirmed_in_source =
            decrement(self.counters.confirmed_in_source, 1, "confirmed_in_source");
    }

    pub fn on_node_recovered(&mut self, node: &str) {
        if !self.down_nodes.remove(node) {
            log::debug!("Node {node} recovered, but it was not known to be down");
            return;
        }
        log::info!("Node {node} recovered");
        self.counters.confirmed_in_source += 1;
    }

    /// A requested node could not be deployed.
    pub fn on_deployment_failed(&mut self, node: &str) {
        log::info!("Deployment of node {node} has failed");
        self.counters.pending_add = decrement(self.counters.pending_add, 1, "pending_add");
    }

    /// Routes a state transition to the matching counter update.
    pub fn on_node_state_changed(&mut self, node: &str, previous: NodeState, state: NodeState) {
        match (previous, state) {
            (NodeState::Down, NodeState::Free | NodeState::Busy) => self.on_node_recovered(node),
            (previous, NodeState::Down | NodeState::Lost)
                if !previous.is_failed() && self.is_tracked(node) =>
            {
                self.on_node_went_down(node)
            }
            (NodeState::Deploying | NodeState::Configuring, NodeState::Lost) => {
                self.on_deployment_failed(node)
            }
            _ => {
                log::debug!("Node {node} changed state {previous} -> {state}");
            }
        }
    }
}

fn decrement(value: u32, amount: u32, name: &str) -> u32 {
    if value < amount {
        log::warn!("Counter {name} would become negative ({value} - {amount}), clamping to zero");
        0
    } else {
        value - amount
    }
}
