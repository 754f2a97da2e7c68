//! Placement and balance plans
//!
//! A [`Plan`] is the pure output of a decision call. Only the engine adds
//! operations; callers get a read-only value to hand to an executor.

use crate::snapshot::{NodeId, Replica};
use serde::{Deserialize, Serialize};

/// Which decision produced a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Placement,
    Balance,
}

impl PlanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanKind::Placement => "placement",
            PlanKind::Balance => "balance",
        }
    }
}

/// A single operation in a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanOperation {
    /// Create a new replica on `target`
    Place { replica: Replica, target: NodeId },

    /// Relocate a committed replica from `source` to `target`
    Move {
        replica: Replica,
        source: NodeId,
        target: NodeId,
    },
}

impl PlanOperation {
    pub fn replica(&self) -> &Replica {
        match self {
            PlanOperation::Place { replica, .. } | PlanOperation::Move { replica, .. } => replica,
        }
    }

    pub fn target(&self) -> &NodeId {
        match self {
            PlanOperation::Place { target, .. } | PlanOperation::Move { target, .. } => target,
        }
    }

    /// Source node for moves
    pub fn source(&self) -> Option<&NodeId> {
        match self {
            PlanOperation::Place { .. } => None,
            PlanOperation::Move { source, .. } => Some(source),
        }
    }
}

/// Set of operations produced by one placement or balance call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    kind: PlanKind,
    operations: Vec<PlanOperation>,
}

impl Plan {
    pub(crate) fn new(kind: PlanKind) -> Self {
        Self {
            kind,
            operations: Vec::new(),
        }
    }

    pub(crate) fn add_placement(&mut self, replica: &Replica, target: &NodeId) {
        let mut replica = replica.clone();
        replica.node = None;
        self.operations.push(PlanOperation::Place {
            replica,
            target: target.clone(),
        });
    }

    /// Record a move, folding it into an earlier move of the same replica
    ///
    /// A replica moved A to B and then B to C ends up as one move A to C; a
    /// replica moved back to where it started drops out of the plan.
    pub(crate) fn add_move(&mut self, replica: &Replica, source: &NodeId, target: &NodeId) {
        let key = replica.key();
        let earlier = self
            .operations
            .iter()
            .position(|op| matches!(op, PlanOperation::Move { .. }) && op.replica().key() == key);

        match earlier {
            Some(index) => {
                let back_home = self.operations[index].source() == Some(target);
                if back_home {
                    self.operations.remove(index);
                } else if let PlanOperation::Move { target: to, .. } = &mut self.operations[index] {
                    *to = target.clone();
                }
            }
            None => self.operations.push(PlanOperation::Move {
                replica: replica.clone(),
                source: source.clone(),
                target: target.clone(),
            }),
        }
    }

    pub fn kind(&self) -> PlanKind {
        self.kind
    }

    pub fn operations(&self) -> &[PlanOperation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<PlanOperation> {
        self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations that land a replica on `node`
    pub fn targeting<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a PlanOperation> {
        self.operations.iter().filter(move |op| op.target() == node)
    }
}
