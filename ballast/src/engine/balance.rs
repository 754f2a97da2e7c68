//! Balance mode: local search over single replica moves

use super::{seed_existing, skew, weighted_nodes, WeightedNodes};
use crate::error::Result;
use crate::metrics;
use crate::plan::{Plan, PlanKind};
use crate::request::BalanceRequest;
use crate::snapshot::{ClusterSnapshot, NodeId, Replica};
use crate::weighted::WeightPolicy;
use std::cmp::Reverse;
use std::time::Instant;
use tracing::{debug, info};

/// A candidate move and the skew it would leave behind
#[derive(Debug)]
struct Move {
    replica: Replica,
    source: NodeId,
    target: NodeId,
    skew_after: u64,
}

/// Plan moves that bring the request's nodes within `max_skew` of each other
///
/// Each step moves one replica from the heaviest node to the lightest,
/// choosing the replica that lowers the skew the most. The search stops when
/// the skew is within bounds, when no move strictly lowers it, or after as
/// many moves as there are replicas. Stopping early is not an error: the plan
/// may be empty or only partly close the gap.
pub fn compute_balance(
    snapshot: &ClusterSnapshot,
    request: &BalanceRequest,
    policy: &dyn WeightPolicy,
) -> Result<Plan> {
    balance_with_limit(snapshot, request, policy, None)
}

pub(super) fn balance_with_limit(
    snapshot: &ClusterSnapshot,
    request: &BalanceRequest,
    policy: &dyn WeightPolicy,
    max_moves: Option<usize>,
) -> Result<Plan> {
    let started = Instant::now();
    let result = balance(snapshot, request, policy, max_moves);
    metrics::record_decision(PlanKind::Balance, policy.name(), started.elapsed(), &result);
    result
}

fn balance(
    snapshot: &ClusterSnapshot,
    request: &BalanceRequest,
    policy: &dyn WeightPolicy,
    max_moves: Option<usize>,
) -> Result<Plan> {
    let mut nodes = weighted_nodes(snapshot, &request.nodes, policy)?;
    let seeded = seed_existing(&mut nodes, snapshot, |r| request.is_relevant(r.collection()));
    let budget = max_moves.map_or(seeded, |limit| limit.min(seeded));

    let initial_skew = skew(&nodes);
    let mut current_skew = initial_skew;
    let mut plan = Plan::new(PlanKind::Balance);
    let mut moves = 0;

    debug!(
        nodes = nodes.len(),
        replicas = seeded,
        skew = initial_skew,
        max_skew = request.max_skew,
        "Balancing replicas"
    );

    while current_skew > request.max_skew {
        if moves >= budget {
            debug!(moves, "Move budget exhausted");
            break;
        }

        let Some(best) = best_move(&nodes, current_skew) else {
            debug!(skew = current_skew, "No move lowers the skew");
            break;
        };

        if let Some(source) = nodes.get_mut(&best.source) {
            source.commit_remove(&best.replica);
        }
        if let Some(target) = nodes.get_mut(&best.target) {
            target.commit_add(&best.replica);
        }
        debug_assert_eq!(skew(&nodes), best.skew_after);

        debug!(
            replica = %best.replica,
            from = %best.source,
            to = %best.target,
            skew = best.skew_after,
            "Moving replica"
        );
        plan.add_move(&best.replica, &best.source, &best.target);
        current_skew = best.skew_after;
        moves += 1;
    }

    metrics::record_skew(initial_skew, current_skew);
    info!(
        operations = plan.len(),
        moves,
        skew_before = initial_skew,
        skew_after = current_skew,
        policy = policy.name(),
        "Computed balance plan"
    );
    Ok(plan)
}

/// Best single move from the heaviest node to the lightest accepting one
///
/// Nodes that accept no replicas still count towards the skew but are never
/// chosen as target. Returns `None` unless some move leaves a skew strictly
/// below `current_skew`.
fn best_move(nodes: &WeightedNodes, current_skew: u64) -> Option<Move> {
    // min_by_key keeps the first of equal keys, i.e. the smallest node id
    let source = nodes.values().min_by_key(|n| Reverse(n.current_weight()))?;
    let target = nodes
        .values()
        .filter(|n| n.load().is_accepting())
        .min_by_key(|n| n.current_weight())?;
    if source.node() == target.node() {
        return None;
    }

    let others = nodes
        .values()
        .filter(|n| n.node() != source.node() && n.node() != target.node())
        .map(|n| n.current_weight());
    let others_max = others.clone().max();
    let others_min = others.min();

    let mut best: Option<Move> = None;
    let mut best_skew = current_skew;

    for (shard, name) in source.load().hosted() {
        let replica = Replica {
            shard: shard.clone(),
            name: name.clone(),
            node: Some(source.node().clone()),
        };
        if !target.eligible(&replica) {
            continue;
        }

        let source_after = source.weight_without(&replica);
        let target_after = target.marginal_weight(&replica);
        let high = source_after.max(target_after).max(others_max.unwrap_or(0));
        let low = source_after
            .min(target_after)
            .min(others_min.unwrap_or(u64::MAX));
        let skew_after = high - low;

        if skew_after < best_skew {
            best_skew = skew_after;
            best = Some(Move {
                replica,
                source: source.node().clone(),
                target: target.node().clone(),
                skew_after,
            });
        }
    }

    best
}
