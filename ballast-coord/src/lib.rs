//! Coordination-store plumbing for ballast.
//!
//! The decision engine in [`ballast`] never talks to the store. This crate
//! sits between it and a hierarchical, versioned coordination store:
//!
//! - [`CoordinationStore`]: async store contract (get, list, create, conditional
//!   set/delete, atomic batches, change events)
//! - [`MemoryStore`]: in-process implementation of that contract
//! - [`StateAdapter`]: translates store failures into decision-domain outcomes
//! - [`DistributedMap`]: keyed map stored under one directory node
//! - [`ClusterLayout`]: reads a [`ballast::ClusterSnapshot`] from the store and
//!   checks it is still current before a plan is executed
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ballast::{NodeInfo, PlacementEngine, PlacementRequest, SameCollectionPolicy};
//! use ballast_coord::{ClusterLayout, MemoryStore, StateAdapter};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let layout = ClusterLayout::new(StateAdapter::new(Arc::new(MemoryStore::new())));
//! layout.init().await?;
//! layout.register_node(&NodeInfo::new("node-a")).await?;
//! layout.register_node(&NodeInfo::new("node-b")).await?;
//!
//! let snapshot = layout.read_snapshot().await?;
//! let engine = PlacementEngine::new(SameCollectionPolicy::default());
//! let request = PlacementRequest::new("products", ["shard1"], 2, snapshot.node_ids());
//! let plan = engine.place(&snapshot, &request)?;
//!
//! layout.verify_fresh(&snapshot).await?;
//! assert_eq!(plan.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod error;
pub mod layout;
pub mod map;
pub mod memory;
pub mod store;

pub use adapter::{PutOutcome, StateAdapter};
pub use error::{AdapterError, AdapterResult, StoreError};
pub use layout::ClusterLayout;
pub use map::DistributedMap;
pub use memory::MemoryStore;
pub use store::{CoordinationStore, CreateMode, Op, OpResult, StoreEvent, VersionedData};
