//! Fairness-by-co-location weight policy
//!
//! The weight of a node is the sum of:
//! - the number of replicas on the node
//! - `collection_multiplier` times, for each collection, `(replicas of that collection - 1)^2`
//! - `shard_multiplier` times, for each shard, `(replicas of that shard - 1)^2`
//!
//! The running total is maintained with `x^2 - (x - 1)^2 = 2x - 1`: adding a
//! replica when `k` replicas of its collection are already present costs
//! `collection_multiplier * (2k - 1)` on top of the base cost of 1, and the
//! same for its shard.

use crate::snapshot::{NodeInfo, Replica};
use crate::weighted::{NodeLoad, WeightPolicy, WeightedNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_SAME_COLLECTION_MULTIPLIER: u64 = 5;
pub const DEFAULT_SAME_SHARD_MULTIPLIER: u64 = 1000;

/// Factory for [`SameCollectionNode`]s
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SameCollectionPolicy {
    pub collection_multiplier: u64,
    pub shard_multiplier: u64,

    /// Nodes missing any of these attributes take no new replicas
    #[serde(default)]
    pub required_attributes: BTreeMap<String, String>,
}

impl Default for SameCollectionPolicy {
    fn default() -> Self {
        Self {
            collection_multiplier: DEFAULT_SAME_COLLECTION_MULTIPLIER,
            shard_multiplier: DEFAULT_SAME_SHARD_MULTIPLIER,
            required_attributes: BTreeMap::new(),
        }
    }
}

impl SameCollectionPolicy {
    pub fn with_multipliers(collection_multiplier: u64, shard_multiplier: u64) -> Self {
        Self {
            collection_multiplier,
            shard_multiplier,
            ..Default::default()
        }
    }

    pub fn with_required_attributes(mut self, required: BTreeMap<String, String>) -> Self {
        self.required_attributes = required;
        self
    }
}

impl WeightPolicy for SameCollectionPolicy {
    fn name(&self) -> &'static str {
        "same_collection"
    }

    fn weighted_node(&self, info: &NodeInfo) -> Box<dyn WeightedNode> {
        Box::new(SameCollectionNode {
            load: NodeLoad::new(info, &self.required_attributes),
            weight: 0,
            collection_multiplier: self.collection_multiplier,
            shard_multiplier: self.shard_multiplier,
        })
    }
}

/// Weighted node of the fairness-by-co-location policy
#[derive(Debug, Clone)]
pub struct SameCollectionNode {
    load: NodeLoad,
    weight: u64,
    collection_multiplier: u64,
    shard_multiplier: u64,
}

impl SameCollectionNode {
    /// Cost of one more replica given the counts already present
    ///
    /// Saturates at `u64::MAX` instead of overflowing.
    fn added_weight(&self, collection_count: usize, shard_count: usize) -> u64 {
        let mut added: u64 = 1;
        if collection_count > 0 {
            let step = 2 * collection_count as u64 - 1;
            added = added.saturating_add(self.collection_multiplier.saturating_mul(step));
        }
        if shard_count > 0 {
            let step = 2 * shard_count as u64 - 1;
            added = added.saturating_add(self.shard_multiplier.saturating_mul(step));
        }
        added
    }

    fn counts_for(&self, replica: &Replica) -> (usize, usize) {
        (
            self.load.collection_count(replica.collection()),
            self.load.shard_count(&replica.shard),
        )
    }
}

impl WeightedNode for SameCollectionNode {
    fn load(&self) -> &NodeLoad {
        &self.load
    }

    fn marginal_weight(&self, replica: &Replica) -> u64 {
        if self.load.hosts(replica) {
            return self.weight;
        }
        let (collection_count, shard_count) = self.counts_for(replica);
        self.weight
            .saturating_add(self.added_weight(collection_count, shard_count))
    }

    fn weight_without(&self, replica: &Replica) -> u64 {
        if !self.load.hosts(replica) {
            return self.weight;
        }
        let (collection_count, shard_count) = self.counts_for(replica);
        self.weight
            .saturating_sub(self.added_weight(collection_count - 1, shard_count - 1))
    }

    fn commit_add(&mut self, replica: &Replica) {
        let (collection_count, shard_count) = self.counts_for(replica);
        if self.load.insert(replica) {
            self.weight = self
                .weight
                .saturating_add(self.added_weight(collection_count, shard_count));
        }
    }

    fn commit_remove(&mut self, replica: &Replica) {
        if self.load.remove(replica) {
            let (collection_count, shard_count) = self.counts_for(replica);
            self.weight = self
                .weight
                .saturating_sub(self.added_weight(collection_count, shard_count));
        }
    }

    fn current_weight(&self) -> u64 {
        self.weight
    }

    fn recompute_weight(&self) -> u64 {
        let squares = |count: usize| {
            let extra = count.saturating_sub(1) as u64;
            extra.saturating_mul(extra)
        };
        let collections: u64 = self
            .load
            .collection_counts()
            .map(|(_, count)| squares(count))
            .fold(0u64, u64::saturating_add);
        let shards: u64 = self
            .load
            .shard_counts()
            .map(|(_, count)| squares(count))
            .fold(0u64, u64::saturating_add);

        (self.load.replica_count() as u64)
            .saturating_add(self.collection_multiplier.saturating_mul(collections))
            .saturating_add(self.shard_multiplier.saturating_mul(shards))
    }
}
