//! Property-based checks of the incremental weight laws.
//!
//! For every policy, after any sequence of adds and removes the maintained
//! weight equals a from-scratch recomputation, the predicted marginal weight
//! matches the weight after the add, and add-then-remove is an exact inverse.

use ballast::{NodeInfo, Replica, ReplicaCountPolicy, SameCollectionPolicy, WeightPolicy};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Add(Replica),
    Remove(Replica),
}

fn replica_strategy() -> impl Strategy<Value = Replica> {
    (0..3usize, 0..3usize, 0..4usize).prop_map(|(c, s, n)| {
        Replica::new(format!("c{}", c), format!("s{}", s), format!("r{}", n), None)
    })
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => replica_strategy().prop_map(Op::Add),
        1 => replica_strategy().prop_map(Op::Remove),
    ]
}

fn policies() -> Vec<Box<dyn WeightPolicy>> {
    vec![
        Box::new(SameCollectionPolicy::default()),
        Box::new(SameCollectionPolicy::with_multipliers(3, 70)),
        Box::new(ReplicaCountPolicy::default()),
    ]
}

proptest! {
    #[test]
    fn incremental_weight_matches_recompute(ops in prop::collection::vec(op_strategy(), 0..60)) {
        for policy in policies() {
            let mut node = policy.weighted_node(&NodeInfo::new("node-1"));
            for op in &ops {
                match op {
                    Op::Add(r) => node.commit_add(r),
                    Op::Remove(r) => node.commit_remove(r),
                }
                prop_assert_eq!(node.current_weight(), node.recompute_weight());
            }
        }
    }

    #[test]
    fn marginal_weight_predicts_add(
        seed in prop::collection::vec(replica_strategy(), 0..30),
        candidate in replica_strategy(),
    ) {
        for policy in policies() {
            let mut node = policy.weighted_node(&NodeInfo::new("node-1"));
            for r in &seed {
                node.init_from_existing(r);
            }
            let predicted = node.marginal_weight(&candidate);
            node.commit_add(&candidate);
            prop_assert_eq!(node.current_weight(), predicted);
        }
    }

    #[test]
    fn weight_without_predicts_remove(
        seed in prop::collection::vec(replica_strategy(), 1..30),
        pick in any::<prop::sample::Index>(),
    ) {
        for policy in policies() {
            let mut node = policy.weighted_node(&NodeInfo::new("node-1"));
            for r in &seed {
                node.commit_add(r);
            }
            let victim = pick.get(&seed);
            let predicted = node.weight_without(victim);
            node.commit_remove(victim);
            prop_assert_eq!(node.current_weight(), predicted);
        }
    }

    #[test]
    fn add_then_remove_restores_state(
        seed in prop::collection::vec(replica_strategy(), 0..30),
        candidate in replica_strategy(),
    ) {
        for policy in policies() {
            let mut node = policy.weighted_node(&NodeInfo::new("node-1"));
            for r in &seed {
                node.init_from_existing(r);
            }
            if node.load().hosts(&candidate) {
                continue;
            }

            let weight_before = node.current_weight();
            let load_before = node.load().clone();

            node.commit_add(&candidate);
            node.commit_remove(&candidate);

            prop_assert_eq!(node.current_weight(), weight_before);
            prop_assert_eq!(node.load(), &load_before);
        }
    }
}
