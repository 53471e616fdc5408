use std::time::SystemTime;

use crate::policy::config::{BillingWindow, PolicyConfig};
use crate::policy::registry::{NodeId, NodeRegistry, NodeState};

/// Node picked for release. It is already removed from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pick {
    pub node: NodeId,
    pub state: NodeState,
    /// Whether the release counts toward the requested number of removals.
    pub counts: bool,
}

/// Returns the last known state of a node, `None` if it could not be determined.
pub type StateLookup<'a> = dyn Fn(&str) -> Option<NodeState> + 'a;

/// Picks nodes that should be released from the pool.
pub trait RemovalSelector {
    /// Selects at most one node and removes it from `registry`.
    fn select(
        &self,
        registry: &mut NodeRegistry,
        state_of: &StateLookup,
        now: SystemTime,
    ) -> Option<Pick>;
}

pub fn create_selector(config: &PolicyConfig) -> Box<dyn RemovalSelector> {
    match config.billing_window() {
        Some(window) => Box::new(BillingWindowSelector::new(window)),
        None => Box::new(FifoSelector),
    }
}

/// Releases the oldest nodes first.
pub struct FifoSelector;

impl RemovalSelector for FifoSelector {
    fn select(
        &self,
        registry: &mut NodeRegistry,
        state_of: &StateLookup,
        _now: SystemTime,
    ) -> Option<Pick> {
        let pick = registry.iter_oldest_first().find_map(|(node, _)| {
            match state_of(node) {
                Some(state) if state.is_usable() => Some(Pick {
                    node: node.clone(),
                    state,
                    counts: true,
                }),
                Some(state) if state.is_failed() => Some(Pick {
                    node: node.clone(),
                    state,
                    counts: false,
                }),
                Some(state) => {
                    log::debug!("Node {node} is in state {state}, it cannot be released now");
                    None
                }
                None => {
                    log::debug!("State of node {node} is unknown, skipping it");
                    None
                }
            }
        })?;
        registry.remove(&pick.node);
        Some(pick)
    }
}

/// Releases only nodes that are close to the end of their billing period.
pub struct BillingWindowSelector {
    window: BillingWindow,
}

impl BillingWindowSelector {
    pub fn new(window: BillingWindow) -> Self {
        Self { window }
    }
}

/// Lower value is released first.
fn removal_priority(state: NodeState) -> usize {
    match state {
        NodeState::Down | NodeState::Lost => 0,
        NodeState::Free => 1,
        NodeState::Busy | NodeState::Configuring | NodeState::Deploying => 2,
    }
}

impl RemovalSelector for BillingWindowSelector {
    fn select(
        &self,
        registry: &mut NodeRegistry,
        state_of: &StateLookup,
        now: SystemTime,
    ) -> Option<Pick> {
        let mut buckets: [Option<(&NodeId, NodeState)>; 3] = [None, None, None];
        for (node, acquired_at) in registry.iter_oldest_first() {
            // A node acquired "in the future" (clock skew) is at the start of its period
            let elapsed = now.duration_since(*acquired_at).unwrap_or_default();
            if !self.window.is_releasable(elapsed) {
                continue;
            }
            let Some(state) = state_of(node) else {
                log::debug!("State of node {node} is unknown, skipping it");
                continue;
            };
            let bucket = &mut buckets[removal_priority(state)];
            if bucket.is_none() {
                *bucket = Some((node, state));
            }
            if buckets[0].is_some() {
                break;
            }
        }
        let (node, state) = buckets.into_iter().flatten().next()?;
        let pick = Pick {
            node: node.clone(),
            state,
            counts: !state.is_failed(),
        };
        registry.remove(&pick.node);
        Some(pick)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::{BillingWindowSelector, FifoSelector, Pick, RemovalSelector};
    use crate::common::Map;
    use crate::policy::config::BillingWindow;
    use crate::policy::registry::{NodeRegistry, NodeState};

    fn registry(nodes: &[(&str, u64)]) -> NodeRegistry {
        let mut registry = NodeRegistry::default();
        for (node, secs) in nodes {
            registry.insert(node.to_string(), SystemTime::UNIX_EPOCH + Duration::from_secs(*secs));
        }
        registry
    }

    fn states(states: &[(&str, NodeState)]) -> Map<String, NodeState> {
        states
            .iter()
            .map(|(node, state)| (node.to_string(), *state))
            .collect()
    }

    fn select(
        selector: &dyn RemovalSelector,
        registry: &mut NodeRegistry,
        states: &Map<String, NodeState>,
        now_secs: u64,
    ) -> Option<Pick> {
        selector.select(
            registry,
            &|node| states.get(node).copied(),
            SystemTime::UNIX_EPOCH + Duration::from_secs(now_secs),
        )
    }

    fn hourly_window() -> BillingWindowSelector {
        BillingWindowSelector::new(BillingWindow {
            delay: Duration::from_secs(3600),
            threshold: Duration::from_secs(600),
        })
    }

    #[test]
    fn fifo_picks_oldest() {
        let mut registry = registry(&[("a", 0), ("b", 1), ("c", 2)]);
        let states = states(&[
            ("a", NodeState::Busy),
            ("b", NodeState::Free),
            ("c", NodeState::Free),
        ]);
        let pick = select(&FifoSelector, &mut registry, &states, 10).unwrap();
        assert_eq!(pick.node, "a");
        assert!(pick.counts);
        assert_eq!(registry.node_ids(), vec!["b", "c"]);
    }

    #[test]
    fn fifo_skips_transient_and_unknown() {
        let mut registry = registry(&[("a", 0), ("b", 1), ("c", 2), ("d", 3)]);
        let states = states(&[
            ("a", NodeState::Configuring),
            ("b", NodeState::Deploying),
            ("d", NodeState::Free),
        ]);
        let pick = select(&FifoSelector, &mut registry, &states, 10).unwrap();
        assert_eq!(pick.node, "d");
        assert_eq!(registry.node_ids(), vec!["a", "b", "c"]);
        assert_eq!(select(&FifoSelector, &mut registry, &states, 10), None);
    }

    #[test]
    fn fifo_failed_node_does_not_count() {
        let mut registry = registry(&[("a", 0), ("b", 1)]);
        let states = states(&[("a", NodeState::Lost), ("b", NodeState::Free)]);
        let pick = select(&FifoSelector, &mut registry, &states, 10).unwrap();
        assert_eq!(pick.node, "a");
        assert!(!pick.counts);
        assert!(!registry.contains("a"));
    }

    #[test]
    fn fifo_empty_registry() {
        let mut registry = NodeRegistry::default();
        assert_eq!(select(&FifoSelector, &mut registry, &Map::new(), 0), None);
    }

    #[test]
    fn billing_respects_threshold() {
        // Aged 3000s: 600s remaining, aged 1000s: 2600s remaining
        let mut registry = registry(&[("young", 2000), ("old", 0)]);
        let states = states(&[("young", NodeState::Free), ("old", NodeState::Free)]);
        let pick = select(&hourly_window(), &mut registry, &states, 3000).unwrap();
        assert_eq!(pick.node, "old");
        assert_eq!(select(&hourly_window(), &mut registry, &states, 3000), None);
        assert!(registry.contains("young"));
    }

    #[test]
    fn billing_state_priority() {
        let mut registry = registry(&[("busy", 0), ("free", 0), ("lost", 0), ("deploying", 0)]);
        let states = states(&[
            ("busy", NodeState::Busy),
            ("free", NodeState::Free),
            ("lost", NodeState::Lost),
            ("deploying", NodeState::Deploying),
        ]);
        let order: Vec<(String, bool)> =
            std::iter::from_fn(|| select(&hourly_window(), &mut registry, &states, 3300))
                .map(|pick| (pick.node, pick.counts))
                .collect();
        assert_eq!(
            order,
            vec![
                ("lost".to_string(), false),
                ("free".to_string(), true),
                ("busy".to_string(), true),
                ("deploying".to_string(), true),
            ]
        );
    }

    #[test]
    fn billing_oldest_within_bucket() {
        let mut registry = registry(&[("first", 3600), ("second", 0)]);
        let states = states(&[("first", NodeState::Free), ("second", NodeState::Free)]);
        // Both nodes are 300s before the end of a period
        let pick = select(&hourly_window(), &mut registry, &states, 3600 + 3300).unwrap();
        assert_eq!(pick.node, "first");
    }

    #[test]
    fn billing_skips_unknown_state() {
        let mut registry = registry(&[("a", 0)]);
        assert_eq!(select(&hourly_window(), &mut registry, &Map::new(), 3300), None);
        assert!(registry.contains("a"));
    }
}
