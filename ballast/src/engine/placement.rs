//! Placement mode: greedy ordered assignment of new replicas

use super::{seed_existing, weighted_nodes};
use crate::error::{PlacementError, Result};
use crate::metrics;
use crate::plan::{Plan, PlanKind};
use crate::request::PlacementRequest;
use crate::snapshot::{ClusterSnapshot, Replica};
use crate::weighted::WeightPolicy;
use std::time::Instant;
use tracing::{debug, info};

/// Decide a node for every replica the request asks for
///
/// Replicas are assigned in shard-name then ordinal order. Each goes to the
/// eligible node with the smallest marginal weight, ties broken by current
/// weight and then node id. If any replica has no eligible node the whole
/// request fails and no plan is returned.
pub fn compute_placement(
    snapshot: &ClusterSnapshot,
    request: &PlacementRequest,
    policy: &dyn WeightPolicy,
) -> Result<Plan> {
    let started = Instant::now();
    let result = place(snapshot, request, policy);
    metrics::record_decision(PlanKind::Placement, policy.name(), started.elapsed(), &result);
    result
}

fn place(
    snapshot: &ClusterSnapshot,
    request: &PlacementRequest,
    policy: &dyn WeightPolicy,
) -> Result<Plan> {
    let mut nodes = weighted_nodes(snapshot, &request.nodes, policy)?;
    let seeded = seed_existing(&mut nodes, snapshot, |_| true);

    let pending = pending_replicas(snapshot, request);
    debug!(
        collection = %request.collection,
        pending = pending.len(),
        nodes = nodes.len(),
        seeded,
        "Placing replicas"
    );

    let mut plan = Plan::new(PlanKind::Placement);
    for replica in &pending {
        // BTreeMap iteration is in node id order and min_by_key keeps the
        // first minimum, so equal keys resolve to the smallest node id.
        let target = nodes
            .values_mut()
            .filter(|node| node.eligible(replica))
            .min_by_key(|node| (node.marginal_weight(replica), node.current_weight()))
            .ok_or_else(|| PlacementError::NoEligibleNode {
                replica: replica.name.clone(),
            })?;

        let predicted = target.marginal_weight(replica);
        target.commit_add(replica);
        debug_assert_eq!(target.current_weight(), predicted);

        debug!(
            replica = %replica,
            node = %target.node(),
            weight = predicted,
            "Assigned replica"
        );
        plan.add_placement(replica, target.node());
    }

    info!(
        collection = %request.collection,
        operations = plan.len(),
        policy = policy.name(),
        "Computed placement plan"
    );
    Ok(plan)
}

/// New replicas to create, in shard name then ordinal order
///
/// Ordinals continue after the replicas the shard already has, skipping any
/// generated name that is already taken.
fn pending_replicas(snapshot: &ClusterSnapshot, request: &PlacementRequest) -> Vec<Replica> {
    let mut pending = Vec::with_capacity(request.replica_total());

    for shard in request.shard_keys() {
        let existing = snapshot.shard_replicas(&shard);
        let mut ordinal = existing.len();

        for _ in 0..request.replicas_per_shard {
            let replica = loop {
                ordinal += 1;
                let candidate = Replica::pending(&shard, ordinal);
                if !existing.iter().any(|e| e.name == candidate.name) {
                    break candidate;
                }
            };
            pending.push(replica);
        }
    }

    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanOperation;
    use crate::policy::SameCollectionPolicy;
    use crate::snapshot::{NodeId, NodeInfo, ShardKey};

    fn three_nodes() -> ClusterSnapshot {
        ClusterSnapshot::builder()
            .node(NodeInfo::new("a"))
            .node(NodeInfo::new("b"))
            .node(NodeInfo::new("c"))
            .build()
    }

    fn targets(plan: &Plan) -> Vec<&str> {
        plan.operations().iter().map(|op| op.target().as_str()).collect()
    }

    #[test]
    fn test_same_shard_replicas_spread() {
        let request = PlacementRequest::new("x", ["s1"], 3, ["a", "b", "c"]);
        let plan =
            compute_placement(&three_nodes(), &request, &SameCollectionPolicy::default()).unwrap();

        assert_eq!(plan.kind(), PlanKind::Placement);
        assert_eq!(targets(&plan), vec!["a", "b", "c"]);
        let names: Vec<_> = plan
            .operations()
            .iter()
            .map(|op| op.replica().name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["x_s1_replica_n1", "x_s1_replica_n2", "x_s1_replica_n3"]
        );
    }

    #[test]
    fn test_avoids_same_collection_node() {
        let snapshot = ClusterSnapshot::builder()
            .node(NodeInfo::new("a"))
            .node(NodeInfo::new("b"))
            .replica("x", "s1", "r1", "a")
            .replica("x", "s2", "r1", "a")
            .build();

        let request = PlacementRequest::new("x", ["s3"], 1, ["a", "b"]);
        let plan =
            compute_placement(&snapshot, &request, &SameCollectionPolicy::default()).unwrap();

        assert_eq!(
            plan.operations(),
            &[PlanOperation::Place {
                replica: Replica::pending(&ShardKey::new("x", "s3"), 1),
                target: NodeId::from("b"),
            }]
        );
    }

    #[test]
    fn test_ordinals_continue_after_existing() {
        let snapshot = ClusterSnapshot::builder()
            .node(NodeInfo::new("a"))
            .node(NodeInfo::new("b"))
            .replica("x", "s1", "x_s1_replica_n2", "a")
            .build();

        let request = PlacementRequest::new("x", ["s1"], 2, ["a", "b"]);
        let pending = pending_replicas(&snapshot, &request);
        let names: Vec<_> = pending.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["x_s1_replica_n3", "x_s1_replica_n4"]);
    }

    #[test]
    fn test_draining_node_receives_nothing() {
        let snapshot = ClusterSnapshot::builder()
            .node(NodeInfo::new("a").with_draining(true))
            .node(NodeInfo::new("b"))
            .build();

        let request = PlacementRequest::new("x", ["s1", "s2"], 1, ["a", "b"]);
        let plan =
            compute_placement(&snapshot, &request, &SameCollectionPolicy::default()).unwrap();
        assert_eq!(targets(&plan), vec!["b", "b"]);
    }

    #[test]
    fn test_no_eligible_node_is_fatal() {
        let snapshot = ClusterSnapshot::builder()
            .node(NodeInfo::new("a").with_draining(true))
            .build();

        let request = PlacementRequest::new("x", ["s1"], 1, ["a"]);
        let result = compute_placement(&snapshot, &request, &SameCollectionPolicy::default());
        assert_eq!(
            result,
            Err(PlacementError::NoEligibleNode {
                replica: "x_s1_replica_n1".to_string()
            })
        );
    }

    #[test]
    fn test_zero_replicas_yields_empty_plan() {
        let request = PlacementRequest::new("x", ["s1"], 0, ["a"]);
        let plan =
            compute_placement(&three_nodes(), &request, &SameCollectionPolicy::default()).unwrap();
        assert!(plan.is_empty());
    }
}
