//! Read-only cluster snapshot consumed by placement and balance decisions
//!
//! A snapshot is built once per decision call (usually from the coordination
//! store) and never mutated afterwards. It knows which nodes are live, which
//! shards exist and where every committed replica lives.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Opaque identifier of a cluster member
///
/// The derived total order is the tie-break order used by the engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Facts about a live node as reported by topology discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique node identifier
    pub id: NodeId,

    /// Node tags (zone, disk type, role, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Draining nodes accept no new replicas; existing ones still count
    #[serde(default)]
    pub draining: bool,
}

impl NodeInfo {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
            draining: false,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_draining(mut self, draining: bool) -> Self {
        self.draining = draining;
        self
    }

    /// Check that every required attribute is present with the same value
    pub fn satisfies(&self, required: &BTreeMap<String, String>) -> bool {
        required
            .iter()
            .all(|(key, value)| self.attributes.get(key) == Some(value))
    }
}

/// Identifies a shard by collection and shard name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardKey {
    pub collection: String,
    pub shard: String,
}

impl ShardKey {
    pub fn new(collection: impl Into<String>, shard: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            shard: shard.into(),
        }
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.shard)
    }
}

/// One copy of a shard, either hosted on a node or pending assignment
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Replica {
    /// Owning shard
    pub shard: ShardKey,

    /// Replica name, unique within its shard
    pub name: String,

    /// Hosting node, `None` while pending
    pub node: Option<NodeId>,
}

impl Replica {
    pub fn new(
        collection: impl Into<String>,
        shard: impl Into<String>,
        name: impl Into<String>,
        node: Option<NodeId>,
    ) -> Self {
        Self {
            shard: ShardKey::new(collection, shard),
            name: name.into(),
            node,
        }
    }

    /// Create a not-yet-assigned replica with the conventional generated name
    pub fn pending(shard: &ShardKey, ordinal: usize) -> Self {
        Self {
            name: format!("{}_{}_replica_n{}", shard.collection, shard.shard, ordinal),
            shard: shard.clone(),
            node: None,
        }
    }

    pub fn collection(&self) -> &str {
        &self.shard.collection
    }

    pub fn is_pending(&self) -> bool {
        self.node.is_none()
    }

    /// Identity of this replica regardless of where it lives
    pub fn key(&self) -> (ShardKey, String) {
        (self.shard.clone(), self.name.clone())
    }
}

impl fmt::Display for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Immutable view of the cluster at decision time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Version of the cluster state this snapshot was read at
    pub epoch: u64,

    nodes: BTreeMap<NodeId, NodeInfo>,

    /// Known shards and their committed replicas, by collection then shard
    collections: BTreeMap<String, BTreeMap<String, Vec<Replica>>>,
}

impl ClusterSnapshot {
    pub fn builder() -> ClusterSnapshotBuilder {
        ClusterSnapshotBuilder::default()
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeInfo> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// All live nodes in identifier order
    pub fn nodes(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> BTreeSet<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    pub fn shard_exists(&self, shard: &ShardKey) -> bool {
        self.collections
            .get(&shard.collection)
            .is_some_and(|shards| shards.contains_key(&shard.shard))
    }

    /// Committed replicas of a shard; empty when the shard does not exist yet
    pub fn shard_replicas(&self, shard: &ShardKey) -> &[Replica] {
        self.collections
            .get(&shard.collection)
            .and_then(|shards| shards.get(&shard.shard))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every committed replica in (collection, shard, name) order
    pub fn replicas(&self) -> impl Iterator<Item = &Replica> {
        self.collections.values().flat_map(|shards| shards.values().flatten())
    }

    /// Replicas hosted on a node
    pub fn replicas_on<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Replica> + 'a {
        self.replicas()
            .filter(move |replica| replica.node.as_ref() == Some(node))
    }

    pub fn collections(&self) -> BTreeSet<&str> {
        self.collections.keys().map(String::as_str).collect()
    }

    pub fn replica_count(&self) -> usize {
        self.replicas().count()
    }
}

/// Builder for [`ClusterSnapshot`]
#[derive(Debug, Default)]
pub struct ClusterSnapshotBuilder {
    snapshot: ClusterSnapshot,
}

impl ClusterSnapshotBuilder {
    pub fn epoch(mut self, epoch: u64) -> Self {
        self.snapshot.epoch = epoch;
        self
    }

    pub fn node(mut self, info: NodeInfo) -> Self {
        self.snapshot.nodes.insert(info.id.clone(), info);
        self
    }

    /// Declare a shard that exists but may have no replicas yet
    pub fn shard(mut self, collection: &str, shard: &str) -> Self {
        self.snapshot
            .collections
            .entry(collection.to_string())
            .or_default()
            .entry(shard.to_string())
            .or_default();
        self
    }

    /// Add a committed replica hosted on `node`
    pub fn replica(mut self, collection: &str, shard: &str, name: &str, node: &str) -> Self {
        self.push_replica(Replica::new(
            collection,
            shard,
            name,
            Some(NodeId::from(node)),
        ));
        self
    }

    pub fn push_replica(&mut self, replica: Replica) {
        let replicas = self
            .snapshot
            .collections
            .entry(replica.shard.collection.clone())
            .or_default()
            .entry(replica.shard.shard.clone())
            .or_default();
        replicas.retain(|existing| existing.name != replica.name);
        replicas.push(replica);
        replicas.sort_by(|a, b| a.name.cmp(&b.name));
    }

    pub fn push_node(&mut self, info: NodeInfo) {
        self.snapshot.nodes.insert(info.id.clone(), info);
    }

    pub fn build(self) -> ClusterSnapshot {
        self.snapshot
    }
}
