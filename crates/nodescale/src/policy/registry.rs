use std::fmt::{Display, Formatter};
use std::time::SystemTime;

use lru::LruCache;
use serde::{Deserialize, Serialize};

/// Name of a node, as reported by the node source.
pub type NodeId = String;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    Free,
    Busy,
    Down,
    Lost,
    Configuring,
    Deploying,
}

impl NodeState {
    /// The node is running and can execute tasks.
    pub fn is_usable(&self) -> bool {
        matches!(self, NodeState::Free | NodeState::Busy)
    }

    /// The node is not running anymore.
    pub fn is_failed(&self) -> bool {
        matches!(self, NodeState::Down | NodeState::Lost)
    }
}

impl Display for NodeState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeState::Free => "FREE",
            NodeState::Busy => "BUSY",
            NodeState::Down => "DOWN",
            NodeState::Lost => "LOST",
            NodeState::Configuring => "CONFIGURING",
            NodeState::Deploying => "DEPLOYING",
        };
        f.write_str(name)
    }
}

/// Nodes confirmed in the node source that were not picked for release yet, kept in the order
/// in which they were acquired.
///
/// The cache is unbounded and only `peek`-style accessors are used, so the LRU order is the
/// insertion order.
pub struct NodeRegistry {
    nodes: LruCache<NodeId, SystemTime>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self {
            nodes: LruCache::unbounded(),
        }
    }
}

impl NodeRegistry {
    /// Returns `false` if the node was already registered; its original position is kept.
    pub fn insert(&mut self, node: NodeId, acquired_at: SystemTime) -> bool {
        if self.nodes.contains(&node) {
            return false;
        }
        self.nodes.put(node, acquired_at);
        true
    }

    /// Removes the node and returns its acquisition time.
    pub fn remove(&mut self, node: &str) -> Option<SystemTime> {
        self.nodes.pop(node)
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains(node)
    }

    /// Iterates the nodes from the oldest one.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = (&NodeId, &SystemTime)> {
        self.nodes.iter().rev()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.iter_oldest_first().map(|(id, _)| id.clone()).collect()
    }

    /// Removes every node, oldest first.
    pub fn drain(&mut self) -> Vec<NodeId> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        while let Some((id, _)) = self.nodes.pop_lru() {
            nodes.push(id);
        }
        nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
