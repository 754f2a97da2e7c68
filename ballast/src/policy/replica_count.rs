//! Replica-count weight policy: every replica costs 1, nothing else matters

use crate::snapshot::{NodeInfo, Replica};
use crate::weighted::{NodeLoad, WeightPolicy, WeightedNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaCountPolicy {
    #[serde(default)]
    pub required_attributes: BTreeMap<String, String>,
}

impl WeightPolicy for ReplicaCountPolicy {
    fn name(&self) -> &'static str {
        "replica_count"
    }

    fn weighted_node(&self, info: &NodeInfo) -> Box<dyn WeightedNode> {
        Box::new(ReplicaCountNode {
            load: NodeLoad::new(info, &self.required_attributes),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReplicaCountNode {
    load: NodeLoad,
}

impl WeightedNode for ReplicaCountNode {
    fn load(&self) -> &NodeLoad {
        &self.load
    }

    fn marginal_weight(&self, replica: &Replica) -> u64 {
        let count = self.load.replica_count() as u64;
        if self.load.hosts(replica) {
            count
        } else {
            count + 1
        }
    }

    fn weight_without(&self, replica: &Replica) -> u64 {
        let count = self.load.replica_count() as u64;
        if self.load.hosts(replica) {
            count - 1
        } else {
            count
        }
    }

    fn commit_add(&mut self, replica: &Replica) {
        self.load.insert(replica);
    }

    fn commit_remove(&mut self, replica: &Replica) {
        self.load.remove(replica);
    }

    fn current_weight(&self) -> u64 {
        self.load.replica_count() as u64
    }

    fn recompute_weight(&self) -> u64 {
        self.load.hosted().count() as u64
    }
}
