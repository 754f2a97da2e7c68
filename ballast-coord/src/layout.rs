//! Cluster layout stored in the coordination store.
//!
//! ```text
//! /live_nodes/{node}                        ephemeral, one per live node
//! /node_props/{node}                        {"attributes": {...}, "draining": false}
//! /collections/{collection}/shards/{shard}/{replica}   {"node": "node-1"}
//! /cluster_epoch                            data version is the layout epoch
//! ```
//!
//! Every write made through [`ClusterLayout`] bumps the epoch, so a snapshot
//! read at epoch `e` can later be checked with [`ClusterLayout::verify_fresh`].

use std::collections::BTreeMap;

use ballast::{ClusterSnapshot, NodeId, NodeInfo, PlacementError, Replica, ShardKey};
use bytes::Bytes;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::adapter::{PutOutcome, StateAdapter};
use crate::error::{AdapterError, AdapterResult};
use crate::store::{join, CreateMode};

pub const LIVE_NODES: &str = "/live_nodes";
pub const NODE_PROPS: &str = "/node_props";
pub const COLLECTIONS: &str = "/collections";
pub const CLUSTER_EPOCH: &str = "/cluster_epoch";

#[derive(Debug, Default, Serialize, Deserialize)]
struct NodeProps {
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    draining: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReplicaRecord {
    node: Option<NodeId>,
}

fn to_json<T: Serialize>(path: &str, value: &T) -> AdapterResult<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| AdapterError::Malformed {
            path: path.to_string(),
            detail: e.to_string(),
        })
}

/// Reads and writes the cluster layout through a [`StateAdapter`].
#[derive(Debug, Clone)]
pub struct ClusterLayout {
    adapter: StateAdapter,
}

impl ClusterLayout {
    pub fn new(adapter: StateAdapter) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &StateAdapter {
        &self.adapter
    }

    pub fn shards_path(collection: &str) -> String {
        join(&join(COLLECTIONS, collection), "shards")
    }

    pub fn shard_path(shard: &ShardKey) -> String {
        join(&Self::shards_path(&shard.collection), &shard.shard)
    }

    /// Create the top-level directories and the epoch node.
    pub async fn init(&self) -> AdapterResult<()> {
        for dir in [LIVE_NODES, NODE_PROPS, COLLECTIONS, CLUSTER_EPOCH] {
            self.adapter
                .make_path(dir, Bytes::new(), CreateMode::Persistent, true)
                .await?;
        }
        Ok(())
    }

    /// Current layout epoch; 0 before the first write.
    pub async fn epoch(&self) -> AdapterResult<u64> {
        Ok(self
            .adapter
            .get_data(CLUSTER_EPOCH)
            .await?
            .map_or(0, |data| data.version))
    }

    async fn bump_epoch(&self) -> AdapterResult<u64> {
        self.adapter
            .make_path(CLUSTER_EPOCH, Bytes::new(), CreateMode::Persistent, true)
            .await?;
        let epoch = self
            .adapter
            .set_data(CLUSTER_EPOCH, Bytes::new(), None)
            .await?;
        debug!(epoch, "Bumped cluster epoch");
        Ok(epoch)
    }

    /// Publish a node's properties and mark it live.
    ///
    /// The live marker is ephemeral and disappears with the store session.
    pub async fn register_node(&self, info: &NodeInfo) -> AdapterResult<()> {
        let props_path = join(NODE_PROPS, info.id.as_str());
        let props = NodeProps {
            attributes: info.attributes.clone(),
            draining: info.draining,
        };
        self.adapter
            .make_path(
                &props_path,
                to_json(&props_path, &props)?,
                CreateMode::Persistent,
                false,
            )
            .await?;
        self.adapter
            .make_path(
                &join(LIVE_NODES, info.id.as_str()),
                Bytes::new(),
                CreateMode::Ephemeral,
                true,
            )
            .await?;
        self.bump_epoch().await?;
        info!(node = %info.id, "Registered node");
        Ok(())
    }

    /// Declare a shard with no replicas yet.
    pub async fn create_shard(&self, shard: &ShardKey) -> AdapterResult<PutOutcome> {
        let outcome = self
            .adapter
            .make_path(
                &Self::shard_path(shard),
                Bytes::new(),
                CreateMode::Persistent,
                true,
            )
            .await?;
        if outcome.is_created() {
            self.bump_epoch().await?;
        }
        Ok(outcome)
    }

    /// Record where a replica is committed, creating its shard if needed.
    pub async fn record_replica(&self, replica: &Replica) -> AdapterResult<()> {
        let path = join(&Self::shard_path(&replica.shard), &replica.name);
        let record = ReplicaRecord {
            node: replica.node.clone(),
        };
        self.adapter
            .make_path(&path, to_json(&path, &record)?, CreateMode::Persistent, false)
            .await?;
        self.bump_epoch().await?;
        debug!(replica = %replica, node = ?replica.node, "Recorded replica");
        Ok(())
    }

    pub async fn shard_exists(&self, shard: &ShardKey) -> AdapterResult<bool> {
        self.adapter.has_data(&Self::shard_path(shard)).await
    }

    /// Replicas committed for a shard, in name order; empty if the shard is absent.
    pub async fn committed_replicas(&self, shard: &ShardKey) -> AdapterResult<Vec<Replica>> {
        let shard_path = Self::shard_path(shard);
        let names = self.adapter.list_data(&shard_path).await?;
        let records = try_join_all(names.iter().map(|name| {
            let path = join(&shard_path, name);
            async move { self.adapter.read_json::<ReplicaRecord>(&path).await }
        }))
        .await?;

        Ok(names
            .into_iter()
            .zip(records)
            .map(|(name, record)| {
                let node = record.and_then(|r| r.node);
                Replica::new(shard.collection.clone(), shard.shard.clone(), name, node)
            })
            .collect())
    }

    async fn node_info(&self, id: &str) -> AdapterResult<NodeInfo> {
        let props: NodeProps = self
            .adapter
            .read_json(&join(NODE_PROPS, id))
            .await?
            .unwrap_or_default();
        Ok(NodeInfo {
            id: NodeId::from(id),
            attributes: props.attributes,
            draining: props.draining,
        })
    }

    /// Read live nodes, shards and committed replicas at one epoch.
    ///
    /// If the epoch moves while reading, the read is reported as a conflict
    /// so the caller can try again.
    pub async fn read_snapshot(&self) -> AdapterResult<ClusterSnapshot> {
        let epoch = self.epoch().await?;
        let mut builder = ClusterSnapshot::builder().epoch(epoch);

        let live = self.adapter.list_data(LIVE_NODES).await?;
        for info in try_join_all(live.iter().map(|id| self.node_info(id))).await? {
            builder.push_node(info);
        }

        for collection in self.adapter.list_data(COLLECTIONS).await? {
            let shards = self
                .adapter
                .list_data(&Self::shards_path(&collection))
                .await?;
            for shard in shards {
                builder = builder.shard(&collection, &shard);
                let key = ShardKey::new(collection.clone(), shard);
                for replica in self.committed_replicas(&key).await? {
                    builder.push_replica(replica);
                }
            }
        }

        let after = self.epoch().await?;
        if after != epoch {
            return Err(AdapterError::Conflict {
                path: CLUSTER_EPOCH.to_string(),
                detail: format!("epoch moved from {} to {} during read", epoch, after),
            });
        }

        let snapshot = builder.build();
        debug!(
            epoch,
            nodes = snapshot.node_ids().len(),
            replicas = snapshot.replica_count(),
            "Read cluster snapshot"
        );
        Ok(snapshot)
    }

    /// Fail with [`PlacementError::StaleSnapshot`] if the layout changed
    /// since `snapshot` was read.
    ///
    /// Only writes made through this layout move the epoch. A node whose
    /// session expires drops out of `/live_nodes` without a bump, so node loss
    /// is not detected here; check [`ClusterLayout::lost_nodes`] as well before
    /// executing a plan.
    pub async fn verify_fresh(&self, snapshot: &ClusterSnapshot) -> ballast::Result<()> {
        let actual = self.epoch().await?;
        if actual != snapshot.epoch {
            return Err(PlacementError::StaleSnapshot {
                expected: snapshot.epoch,
                actual,
            });
        }
        Ok(())
    }

    /// Nodes present in `snapshot` that are no longer live.
    pub async fn lost_nodes(&self, snapshot: &ClusterSnapshot) -> AdapterResult<Vec<NodeId>> {
        let live = self.adapter.list_data(LIVE_NODES).await?;
        let lost: Vec<NodeId> = snapshot
            .node_ids()
            .into_iter()
            .filter(|id| !live.iter().any(|l| l == id.as_str()))
            .collect();
        if !lost.is_empty() {
            info!(epoch = snapshot.epoch, lost = lost.len(), "Snapshot nodes no longer live");
        }
        Ok(lost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use std::sync::Arc;

    fn layout() -> ClusterLayout {
        ClusterLayout::new(StateAdapter::new(Arc::new(MemoryStore::new())))
    }

    #[tokio::test]
    async fn test_paths() {
        let key = ShardKey::new("products", "shard1");
        assert_eq!(
            ClusterLayout::shard_path(&key),
            "/collections/products/shards/shard1"
        );
    }

    #[tokio::test]
    async fn test_empty_store_reads_empty_snapshot() {
        let layout = layout();
        let snapshot = layout.read_snapshot().await.unwrap();
        assert_eq!(snapshot, ClusterSnapshot::default());
        assert!(layout.verify_fresh(&snapshot).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_shard_has_no_replicas() {
        let layout = layout();
        let key = ShardKey::new("x", "s1");
        assert!(!layout.shard_exists(&key).await.unwrap());
        assert!(layout.committed_replicas(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_shard_is_idempotent() {
        let layout = layout();
        layout.init().await.unwrap();
        let key = ShardKey::new("x", "s1");

        assert_eq!(layout.create_shard(&key).await.unwrap(), PutOutcome::Created);
        let epoch = layout.epoch().await.unwrap();
        assert_eq!(
            layout.create_shard(&key).await.unwrap(),
            PutOutcome::AlreadyPresent
        );
        assert_eq!(layout.epoch().await.unwrap(), epoch);
        assert!(layout.shard_exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_replica_records_round_trip() {
        let layout = layout();
        let key = ShardKey::new("x", "s1");
        layout
            .record_replica(&Replica::new("x", "s1", "r2", Some(NodeId::from("n2"))))
            .await
            .unwrap();
        layout
            .record_replica(&Replica::new("x", "s1", "r1", Some(NodeId::from("n1"))))
            .await
            .unwrap();

        let replicas = layout.committed_replicas(&key).await.unwrap();
        assert_eq!(
            replicas,
            vec![
                Replica::new("x", "s1", "r1", Some(NodeId::from("n1"))),
                Replica::new("x", "s1", "r2", Some(NodeId::from("n2"))),
            ]
        );
    }

    #[tokio::test]
    async fn test_stale_snapshot_detected() {
        let layout = layout();
        layout.register_node(&NodeInfo::new("n1")).await.unwrap();
        let snapshot = layout.read_snapshot().await.unwrap();
        layout.verify_fresh(&snapshot).await.unwrap();

        layout
            .record_replica(&Replica::new("x", "s1", "r1", Some(NodeId::from("n1"))))
            .await
            .unwrap();
        let err = layout.verify_fresh(&snapshot).await.unwrap_err();
        assert!(matches!(err, PlacementError::StaleSnapshot { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_expired_node_keeps_epoch_but_is_lost() {
        let store = MemoryStore::new();
        let layout = ClusterLayout::new(StateAdapter::new(Arc::new(store.clone())));
        layout.init().await.unwrap();
        for id in ["n1", "n2"] {
            ClusterLayout::new(StateAdapter::new(Arc::new(store.with_session(id))))
                .register_node(&NodeInfo::new(id))
                .await
                .unwrap();
        }
        let snapshot = layout.read_snapshot().await.unwrap();
        assert!(layout.lost_nodes(&snapshot).await.unwrap().is_empty());

        store.expire_session("n2");

        // the epoch is unchanged, only the live set reveals the loss
        layout.verify_fresh(&snapshot).await.unwrap();
        assert_eq!(layout.lost_nodes(&snapshot).await.unwrap(), vec![NodeId::from("n2")]);
    }
}
