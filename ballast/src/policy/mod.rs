//! Concrete weight policies
//!
//! - [`SameCollectionPolicy`]: penalizes co-locating replicas of the same
//!   collection, and far more heavily of the same shard (reference policy)
//! - [`ReplicaCountPolicy`]: plain replica count per node

mod replica_count;
mod same_collection;

pub use replica_count::{ReplicaCountNode, ReplicaCountPolicy};
pub use same_collection::{
    SameCollectionNode, SameCollectionPolicy, DEFAULT_SAME_COLLECTION_MULTIPLIER,
    DEFAULT_SAME_SHARD_MULTIPLIER,
};
