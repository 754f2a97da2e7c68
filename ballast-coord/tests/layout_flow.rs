//! Decisions made against snapshots read from the coordination store

use std::sync::Arc;

use ballast::{
    BalanceRequest, NodeId, NodeInfo, PlacementEngine, PlacementError, PlacementRequest,
    PlanOperation, ReplicaCountPolicy, SameCollectionPolicy, ShardKey,
};
use ballast_coord::{
    ClusterLayout, CoordinationStore, DistributedMap, MemoryStore, StateAdapter, StoreEvent,
};
use bytes::Bytes;

async fn cluster(store: &MemoryStore, nodes: &[&str]) -> ClusterLayout {
    let layout = ClusterLayout::new(StateAdapter::new(Arc::new(store.clone())));
    layout.init().await.unwrap();
    for node in nodes {
        let session = ClusterLayout::new(StateAdapter::new(Arc::new(store.with_session(*node))));
        session
            .register_node(&NodeInfo::new(*node).with_attribute("zone", "eu-1"))
            .await
            .unwrap();
    }
    layout
}

/// Execute a plan by writing each target back to the layout
async fn execute(layout: &ClusterLayout, ops: &[PlanOperation]) {
    for op in ops {
        let mut replica = op.replica().clone();
        replica.node = Some(op.target().clone());
        layout.record_replica(&replica).await.unwrap();
    }
}

#[tokio::test]
async fn placement_round_trips_through_store() {
    let store = MemoryStore::new();
    let layout = cluster(&store, &["n1", "n2", "n3"]).await;

    let snapshot = layout.read_snapshot().await.unwrap();
    assert_eq!(snapshot.node_ids().len(), 3);
    assert_eq!(
        snapshot.node(&NodeId::from("n1")).unwrap().attributes.get("zone"),
        Some(&"eu-1".to_string())
    );

    let engine = PlacementEngine::new(SameCollectionPolicy::default());
    let request = PlacementRequest::new("products", ["shard1", "shard2"], 3, snapshot.node_ids());
    let plan = engine.place(&snapshot, &request).unwrap();
    assert_eq!(plan.len(), 6);

    layout.verify_fresh(&snapshot).await.unwrap();
    execute(&layout, plan.operations()).await;

    let after = layout.read_snapshot().await.unwrap();
    assert_eq!(after.replica_count(), 6);
    for shard in ["shard1", "shard2"] {
        let key = ShardKey::new("products", shard);
        assert!(layout.shard_exists(&key).await.unwrap());
        let hosts: std::collections::BTreeSet<_> = layout
            .committed_replicas(&key)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| r.node)
            .collect();
        assert_eq!(hosts.len(), 3);
    }
}

#[tokio::test]
async fn stale_plan_is_rejected_before_execution() {
    let store = MemoryStore::new();
    let layout = cluster(&store, &["n1", "n2"]).await;

    let snapshot = layout.read_snapshot().await.unwrap();
    let engine = PlacementEngine::new(ReplicaCountPolicy::default());
    let plan = engine
        .place(
            &snapshot,
            &PlacementRequest::new("logs", ["s1"], 1, snapshot.node_ids()),
        )
        .unwrap();

    // Someone else commits a replica in between
    layout
        .record_replica(&ballast::Replica::new(
            "logs",
            "s0",
            "r1",
            Some(NodeId::from("n1")),
        ))
        .await
        .unwrap();

    let err = layout.verify_fresh(&snapshot).await.unwrap_err();
    assert!(matches!(err, PlacementError::StaleSnapshot { .. }));

    // Decide again on a fresh read
    let fresh = layout.read_snapshot().await.unwrap();
    let replan = engine
        .place(&fresh, &PlacementRequest::new("logs", ["s1"], 1, fresh.node_ids()))
        .unwrap();
    layout.verify_fresh(&fresh).await.unwrap();
    assert_eq!(plan.len(), replan.len());
    assert_eq!(replan.operations()[0].target(), &NodeId::from("n2"));
}

#[tokio::test]
async fn balance_against_stored_layout() {
    let store = MemoryStore::new();
    let layout = cluster(&store, &["n1", "n2"]).await;
    for i in 0..6 {
        layout
            .record_replica(&ballast::Replica::new(
                format!("c{}", i),
                "s1",
                "r1",
                Some(NodeId::from("n1")),
            ))
            .await
            .unwrap();
    }

    let snapshot = layout.read_snapshot().await.unwrap();
    let engine = PlacementEngine::new(SameCollectionPolicy::default());
    let plan = engine
        .balance(&snapshot, &BalanceRequest::new(snapshot.node_ids(), 0))
        .unwrap();
    assert_eq!(plan.len(), 3);

    execute(&layout, plan.operations()).await;
    let after = layout.read_snapshot().await.unwrap();
    assert_eq!(after.replicas_on(&NodeId::from("n1")).count(), 3);
    assert_eq!(after.replicas_on(&NodeId::from("n2")).count(), 3);
}

#[tokio::test]
async fn expired_session_drops_live_node() {
    let store = MemoryStore::new();
    let layout = cluster(&store, &["n1", "n2"]).await;
    let mut events = store.subscribe();

    assert_eq!(store.expire_session("n2"), 1);
    assert_eq!(
        events.recv().await.unwrap(),
        StoreEvent::Deleted("/live_nodes/n2".to_string())
    );

    let snapshot = layout.read_snapshot().await.unwrap();
    assert_eq!(
        snapshot.node_ids().into_iter().collect::<Vec<_>>(),
        vec![NodeId::from("n1")]
    );
}

#[tokio::test]
async fn concurrent_put_if_absent_has_one_winner() {
    let store = MemoryStore::new();
    let adapter = StateAdapter::new(Arc::new(store.clone()));
    let map = DistributedMap::open(adapter, "/overseer/claims").await.unwrap();

    let mut handles = Vec::new();
    for worker in 0..8 {
        let map = map.clone();
        handles.push(tokio::spawn(async move {
            map.put_if_absent("shard1", Bytes::from(format!("worker-{}", worker)))
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(map.size().await.unwrap(), 1);
}
