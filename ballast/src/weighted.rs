//! Weighted node abstraction
//!
//! A [`WeightedNode`] is the per-node cost model used during one decision
//! call. It starts from the replicas the snapshot shows on the node, prices
//! candidate replicas without mutating anything, and keeps a running total
//! that is updated incrementally as replicas are provisionally added or
//! removed. The running total must always equal what
//! [`WeightedNode::recompute_weight`] derives from scratch.
//!
//! Policies differ only in their cost function; the shared bookkeeping
//! (hosted replicas, per-collection and per-shard counters, eligibility)
//! lives in [`NodeLoad`].

use crate::snapshot::{NodeId, NodeInfo, Replica, ShardKey};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Replica counters and node facts shared by every policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLoad {
    info: NodeInfo,
    accepting: bool,
    hosted: BTreeSet<(ShardKey, String)>,
    collection_counts: HashMap<String, usize>,
    shard_counts: HashMap<ShardKey, usize>,
}

impl NodeLoad {
    /// Create an empty load for a node
    ///
    /// A node accepts new replicas only when it is not draining and carries
    /// every required attribute.
    pub fn new(info: &NodeInfo, required_attributes: &BTreeMap<String, String>) -> Self {
        Self {
            accepting: !info.draining && info.satisfies(required_attributes),
            info: info.clone(),
            hosted: BTreeSet::new(),
            collection_counts: HashMap::new(),
            shard_counts: HashMap::new(),
        }
    }

    pub fn node(&self) -> &NodeId {
        &self.info.id
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    /// Whether the node takes new replicas at all
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn hosts(&self, replica: &Replica) -> bool {
        self.hosted.contains(&replica.key())
    }

    pub fn replica_count(&self) -> usize {
        self.hosted.len()
    }

    pub fn collection_count(&self, collection: &str) -> usize {
        self.collection_counts.get(collection).copied().unwrap_or(0)
    }

    pub fn shard_count(&self, shard: &ShardKey) -> usize {
        self.shard_counts.get(shard).copied().unwrap_or(0)
    }

    /// Per-collection counters, zero entries omitted
    pub fn collection_counts(&self) -> impl Iterator<Item = (&str, usize)> {
        self.collection_counts
            .iter()
            .map(|(collection, count)| (collection.as_str(), *count))
    }

    /// Per-shard counters, zero entries omitted
    pub fn shard_counts(&self) -> impl Iterator<Item = (&ShardKey, usize)> {
        self.shard_counts.iter().map(|(shard, count)| (shard, *count))
    }

    /// Hosted replicas in (collection, shard, name) order
    pub fn hosted(&self) -> impl Iterator<Item = &(ShardKey, String)> {
        self.hosted.iter()
    }

    /// Record a replica. Returns false when it was already hosted.
    pub fn insert(&mut self, replica: &Replica) -> bool {
        if !self.hosted.insert(replica.key()) {
            return false;
        }
        *self
            .collection_counts
            .entry(replica.collection().to_string())
            .or_insert(0) += 1;
        *self.shard_counts.entry(replica.shard.clone()).or_insert(0) += 1;
        true
    }

    /// Forget a replica. Returns false when it was not hosted.
    pub fn remove(&mut self, replica: &Replica) -> bool {
        if !self.hosted.remove(&replica.key()) {
            return false;
        }
        decrement(&mut self.collection_counts, replica.collection());
        decrement(&mut self.shard_counts, &replica.shard);
        true
    }
}

fn decrement<K, Q>(counts: &mut HashMap<K, usize>, key: &Q)
where
    K: std::borrow::Borrow<Q> + std::hash::Hash + Eq,
    Q: std::hash::Hash + Eq + ?Sized,
{
    if let Some(count) = counts.get_mut(key) {
        *count -= 1;
        if *count == 0 {
            counts.remove(key);
        }
    }
}

/// Per-node incremental cost model
///
/// Implementations must keep `current_weight` equal to `recompute_weight`
/// after any sequence of `init_from_existing`, `commit_add` and
/// `commit_remove`, and `marginal_weight(r)` must equal `current_weight()`
/// right after `commit_add(r)`.
pub trait WeightedNode: fmt::Debug + Send {
    /// Shared bookkeeping
    fn load(&self) -> &NodeLoad;

    fn node(&self) -> &NodeId {
        self.load().node()
    }

    /// Whether this node may receive the replica
    fn eligible(&self, replica: &Replica) -> bool {
        let load = self.load();
        load.is_accepting() && !load.hosts(replica)
    }

    /// Total weight this node would have with the replica added
    fn marginal_weight(&self, replica: &Replica) -> u64;

    /// Total weight this node would have with a hosted replica removed
    fn weight_without(&self, replica: &Replica) -> u64;

    /// Provisionally assign a replica to this node
    fn commit_add(&mut self, replica: &Replica);

    /// Exact inverse of [`WeightedNode::commit_add`]
    fn commit_remove(&mut self, replica: &Replica);

    /// Seed from a replica the snapshot already shows on this node
    fn init_from_existing(&mut self, replica: &Replica) {
        self.commit_add(replica);
    }

    /// Maintained total, O(1)
    fn current_weight(&self) -> u64;

    /// Weight derived from the hosted replica set alone
    fn recompute_weight(&self) -> u64;
}

/// Factory producing one [`WeightedNode`] per node for a single decision call
pub trait WeightPolicy: Send + Sync {
    /// Short policy name for logs and metrics
    fn name(&self) -> &'static str;

    fn weighted_node(&self, info: &NodeInfo) -> Box<dyn WeightedNode>;
}

impl<P: WeightPolicy + ?Sized> WeightPolicy for Box<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn weighted_node(&self, info: &NodeInfo) -> Box<dyn WeightedNode> {
        (**self).weighted_node(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(collection: &str, shard: &str, name: &str) -> Replica {
        Replica::new(collection, shard, name, None)
    }

    #[test]
    fn test_insert_and_remove_counters() {
        let mut load = NodeLoad::new(&NodeInfo::new("node-1"), &BTreeMap::new());
        let r1 = replica("products", "shard1", "r1");
        let r2 = replica("products", "shard2", "r2");

        assert!(load.insert(&r1));
        assert!(load.insert(&r2));
        assert!(!load.insert(&r1));

        assert_eq!(load.replica_count(), 2);
        assert_eq!(load.collection_count("products"), 2);
        assert_eq!(load.shard_count(&ShardKey::new("products", "shard1")), 1);

        assert!(load.remove(&r1));
        assert!(!load.remove(&r1));
        assert_eq!(load.collection_count("products"), 1);
        assert_eq!(load.shard_count(&ShardKey::new("products", "shard1")), 0);
        assert_eq!(load.shard_counts().count(), 1);
    }

    #[test]
    fn test_accepting() {
        let mut required = BTreeMap::new();
        required.insert("disk".to_string(), "ssd".to_string());

        let ssd = NodeInfo::new("node-1").with_attribute("disk", "ssd");
        let hdd = NodeInfo::new("node-2").with_attribute("disk", "hdd");
        let draining = ssd.clone().with_draining(true);

        assert!(NodeLoad::new(&ssd, &required).is_accepting());
        assert!(!NodeLoad::new(&hdd, &required).is_accepting());
        assert!(!NodeLoad::new(&draining, &required).is_accepting());
        assert!(NodeLoad::new(&hdd, &BTreeMap::new()).is_accepting());
    }

    #[test]
    fn test_identity_ignores_node_field() {
        let mut load = NodeLoad::new(&NodeInfo::new("node-1"), &BTreeMap::new());
        let pending = replica("products", "shard1", "r1");
        let mut hosted = pending.clone();
        hosted.node = Some(NodeId::from("node-1"));

        assert!(load.insert(&hosted));
        assert!(load.hosts(&pending));
        assert!(load.remove(&pending));
    }
}
