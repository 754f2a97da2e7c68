//! Decision-domain error types

use crate::snapshot::NodeId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by placement and balance decisions
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementError {
    /// Some pending replica could not go to any candidate node
    #[error("No eligible node for replica {replica}")]
    NoEligibleNode { replica: String },

    #[error("Request names an empty node set")]
    EmptyNodeSet,

    #[error("Node {0} is not part of the cluster snapshot")]
    UnknownNode(NodeId),

    /// The snapshot a decision was made against no longer matches the store
    #[error("Stale cluster snapshot: decided at epoch {expected}, store is at {actual}")]
    StaleSnapshot { expected: u64, actual: u64 },

    /// Version or existence conflict reported by the state adapter
    #[error("Coordination store conflict on {path}: {detail}")]
    AdapterConflict { path: String, detail: String },
}

impl PlacementError {
    /// Get the error type as a string for metrics labeling
    pub fn error_type(&self) -> &'static str {
        match self {
            PlacementError::NoEligibleNode { .. } => "no_eligible_node",
            PlacementError::EmptyNodeSet => "empty_node_set",
            PlacementError::UnknownNode(_) => "unknown_node",
            PlacementError::StaleSnapshot { .. } => "stale_snapshot",
            PlacementError::AdapterConflict { .. } => "adapter_conflict",
        }
    }

    /// Whether the caller should retry the decision against a fresh snapshot
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlacementError::StaleSnapshot { .. } | PlacementError::AdapterConflict { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PlacementError>;
