//! Ballast - replica placement and cluster balancing for sharded search clusters
//!
//! This crate decides which node should host which replica when replicas are
//! created, and which replicas to move to bring a set of nodes back within a
//! weight skew bound. Every decision is a pure function of a read-only
//! [`ClusterSnapshot`] and a request; the result is a [`Plan`] that an external
//! executor applies.
//!
//! # Architecture
//!
//! - **Snapshot**: read-only view of nodes, collections, shards and replicas
//! - **Weighted nodes**: per-node incremental cost model, one instance per node per call
//! - **Policies**: pluggable cost functions producing weighted nodes
//! - **Requests / Plan**: typed inputs and the resulting place/move operations
//! - **Engine**: greedy ordered assignment for placement, local search for balancing
//!
//! # Example
//!
//! ```
//! use ballast::{
//!     compute_placement, ClusterSnapshot, NodeInfo, PlacementRequest, SameCollectionPolicy,
//! };
//!
//! let snapshot = ClusterSnapshot::builder()
//!     .node(NodeInfo::new("node-a"))
//!     .node(NodeInfo::new("node-b"))
//!     .build();
//!
//! let request = PlacementRequest::new("products", ["shard1"], 2, ["node-a", "node-b"]);
//! let plan = compute_placement(&snapshot, &request, &SameCollectionPolicy::default()).unwrap();
//! assert_eq!(plan.len(), 2);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod plan;
pub mod policy;
pub mod request;
pub mod snapshot;
pub mod weighted;

pub use config::{BalancerConfig, LoggingConfig, PolicyKind, MAX_MULTIPLIER};
pub use engine::{compute_balance, compute_placement, PlacementEngine};
pub use error::{PlacementError, Result};
pub use plan::{Plan, PlanKind, PlanOperation};
pub use policy::{ReplicaCountPolicy, SameCollectionPolicy};
pub use request::{BalanceRequest, PlacementRequest};
pub use snapshot::{ClusterSnapshot, ClusterSnapshotBuilder, NodeId, NodeInfo, Replica, ShardKey};
pub use weighted::{NodeLoad, WeightPolicy, WeightedNode};
