//! Ordered-assignment engine
//!
//! Two decision modes share the same per-call setup: one [`WeightedNode`] per
//! requested node, held in a map that lives only for the duration of the call
//! and is seeded from the replicas the snapshot already shows on those nodes.
//!
//! - **Placement** ([`compute_placement`]): greedy, each pending replica goes
//!   to the eligible node with the lowest resulting weight.
//! - **Balance** ([`compute_balance`]): local search, moves replicas from the
//!   heaviest to the lightest node while that strictly lowers the skew.
//!
//! Node ties are broken by [`NodeId`] order, which keeps plans reproducible.

mod balance;
mod placement;

pub use balance::compute_balance;
pub use placement::compute_placement;

use crate::config::BalancerConfig;
use crate::error::{PlacementError, Result};
use crate::plan::Plan;
use crate::request::{BalanceRequest, PlacementRequest};
use crate::snapshot::{ClusterSnapshot, NodeId, Replica};
use crate::weighted::{WeightPolicy, WeightedNode};
use std::collections::{BTreeMap, BTreeSet};

/// Per-call weighted nodes in node identifier order
type WeightedNodes = BTreeMap<NodeId, Box<dyn WeightedNode>>;

/// Build one weighted node per requested node
fn weighted_nodes(
    snapshot: &ClusterSnapshot,
    nodes: &BTreeSet<NodeId>,
    policy: &dyn WeightPolicy,
) -> Result<WeightedNodes> {
    if nodes.is_empty() {
        return Err(PlacementError::EmptyNodeSet);
    }

    nodes
        .iter()
        .map(|id| {
            let info = snapshot
                .node(id)
                .ok_or_else(|| PlacementError::UnknownNode(id.clone()))?;
            Ok((id.clone(), policy.weighted_node(info)))
        })
        .collect()
}

/// Seed weighted nodes from committed replicas; returns how many were seeded
fn seed_existing(
    nodes: &mut WeightedNodes,
    snapshot: &ClusterSnapshot,
    relevant: impl Fn(&Replica) -> bool,
) -> usize {
    let mut seeded = 0;
    for replica in snapshot.replicas().filter(|r| relevant(r)) {
        let Some(node_id) = &replica.node else {
            continue;
        };
        if let Some(node) = nodes.get_mut(node_id) {
            node.init_from_existing(replica);
            seeded += 1;
        }
    }
    seeded
}

/// Difference between the heaviest and the lightest node
fn skew(nodes: &WeightedNodes) -> u64 {
    let weights = nodes.values().map(|n| n.current_weight());
    let max = weights.clone().max().unwrap_or(0);
    let min = weights.min().unwrap_or(0);
    max - min
}

/// Placement engine bound to a configured weight policy
pub struct PlacementEngine {
    policy: Box<dyn WeightPolicy>,
    max_balance_moves: Option<usize>,
}

impl PlacementEngine {
    pub fn new(policy: impl WeightPolicy + 'static) -> Self {
        Self {
            policy: Box::new(policy),
            max_balance_moves: None,
        }
    }

    /// Build the engine described by a configuration
    pub fn from_config(config: &BalancerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            policy: config.policy(),
            max_balance_moves: config.max_balance_moves,
        })
    }

    /// Cap the number of moves a single balance call may plan
    pub fn with_max_balance_moves(mut self, max_moves: usize) -> Self {
        self.max_balance_moves = Some(max_moves);
        self
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn place(&self, snapshot: &ClusterSnapshot, request: &PlacementRequest) -> Result<Plan> {
        compute_placement(snapshot, request, self.policy.as_ref())
    }

    pub fn balance(&self, snapshot: &ClusterSnapshot, request: &BalanceRequest) -> Result<Plan> {
        balance::balance_with_limit(snapshot, request, self.policy.as_ref(), self.max_balance_moves)
    }
}

impl std::fmt::Debug for PlacementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacementEngine")
            .field("policy", &self.policy.name())
            .field("max_balance_moves", &self.max_balance_moves)
            .finish()
    }
}
