//! Placement and balance requests
//!
//! Both request types are plain input values built once per decision call.

use crate::snapshot::{NodeId, ShardKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Create `replicas_per_shard` new replicas for each named shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRequest {
    /// Collection the shards belong to (need not exist yet)
    pub collection: String,

    /// Shard names (need not exist yet)
    pub shards: BTreeSet<String>,

    /// Number of new replicas per shard
    pub replicas_per_shard: usize,

    /// Candidate nodes
    pub nodes: BTreeSet<NodeId>,
}

impl PlacementRequest {
    pub fn new<S, N>(
        collection: impl Into<String>,
        shards: impl IntoIterator<Item = S>,
        replicas_per_shard: usize,
        nodes: impl IntoIterator<Item = N>,
    ) -> Self
    where
        S: Into<String>,
        N: Into<NodeId>,
    {
        Self {
            collection: collection.into(),
            shards: shards.into_iter().map(Into::into).collect(),
            replicas_per_shard,
            nodes: nodes.into_iter().map(Into::into).collect(),
        }
    }

    /// Requested shards in name order
    pub fn shard_keys(&self) -> impl Iterator<Item = ShardKey> + '_ {
        self.shards
            .iter()
            .map(|shard| ShardKey::new(self.collection.clone(), shard.clone()))
    }

    /// Number of replicas the request asks for in total
    pub fn replica_total(&self) -> usize {
        self.shards.len() * self.replicas_per_shard
    }
}

/// Move replicas between `nodes` until their weights differ by at most `max_skew`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRequest {
    pub nodes: BTreeSet<NodeId>,

    /// Maximum tolerated weight difference between any two nodes
    pub max_skew: u64,

    /// Only replicas of these collections are weighed and moved; all when unset
    #[serde(default)]
    pub collections: Option<BTreeSet<String>>,
}

impl BalanceRequest {
    pub fn new<N>(nodes: impl IntoIterator<Item = N>, max_skew: u64) -> Self
    where
        N: Into<NodeId>,
    {
        Self {
            nodes: nodes.into_iter().map(Into::into).collect(),
            max_skew,
            collections: None,
        }
    }

    pub fn with_collections<S>(mut self, collections: impl IntoIterator<Item = S>) -> Self
    where
        S: Into<String>,
    {
        self.collections = Some(collections.into_iter().map(Into::into).collect());
        self
    }

    /// Whether replicas of a collection take part in this balance run
    pub fn is_relevant(&self, collection: &str) -> bool {
        self.collections
            .as_ref()
            .map_or(true, |collections| collections.contains(collection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_request_shard_order() {
        let request = PlacementRequest::new("x", ["s2", "s1", "s1"], 2, ["node-b", "node-a"]);
        let shards: Vec<_> = request.shard_keys().map(|k| k.shard).collect();
        assert_eq!(shards, vec!["s1", "s2"]);
        assert_eq!(request.replica_total(), 4);
        assert_eq!(request.nodes.iter().next(), Some(&NodeId::from("node-a")));
    }

    #[test]
    fn test_balance_request_relevance() {
        let all = BalanceRequest::new(["node-a"], 2);
        assert!(all.is_relevant("anything"));

        let some = BalanceRequest::new(["node-a"], 2).with_collections(["logs"]);
        assert!(some.is_relevant("logs"));
        assert!(!some.is_relevant("products"));
    }
}
