//! Coordination store contract.
//!
//! A hierarchical namespace of versioned byte payloads, in the style of a
//! consensus-backed configuration store. Paths are absolute, `/`-separated,
//! and every node except the root has a parent that must exist.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, StoreError};

/// Lifetime of a created node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateMode {
    /// Lives until deleted
    #[default]
    Persistent,
    /// Removed when the owning session expires
    Ephemeral,
}

/// Payload of a node together with its version and lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedData {
    /// Starts at 0 and increases by one on every set
    pub version: u64,
    pub data: Bytes,
    pub mode: CreateMode,
    /// Session owning an ephemeral node
    pub owner: Option<String>,
}

/// One step of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Create {
        path: String,
        data: Bytes,
        mode: CreateMode,
    },
    Set {
        path: String,
        data: Bytes,
        version: Option<u64>,
    },
    Delete {
        path: String,
        version: Option<u64>,
    },
    /// Fails the batch unless the node is at `version`
    Check { path: String, version: u64 },
}

impl Op {
    pub fn path(&self) -> &str {
        match self {
            Op::Create { path, .. }
            | Op::Set { path, .. }
            | Op::Delete { path, .. }
            | Op::Check { path, .. } => path,
        }
    }
}

/// Outcome of one batch step, in the order the steps were given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpResult {
    Created(String),
    Set { version: u64 },
    Deleted,
    Checked,
}

/// Change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Created(String),
    DataChanged { path: String, version: u64 },
    Deleted(String),
}

impl StoreEvent {
    pub fn path(&self) -> &str {
        match self {
            StoreEvent::Created(path) | StoreEvent::Deleted(path) => path,
            StoreEvent::DataChanged { path, .. } => path,
        }
    }
}

/// Store operations consumed by the state adapter.
///
/// Conditional writes take an expected version; `None` matches any version.
/// Implementations must be `Send + Sync` so one store can back many tasks.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Read a node's payload and version.
    async fn get(&self, path: &str) -> Result<VersionedData>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// Child names (not full paths) in lexicographic order.
    async fn list_children(&self, path: &str) -> Result<Vec<String>>;

    /// Create a node under an existing parent, returning its path.
    async fn create(&self, path: &str, data: Bytes, mode: CreateMode) -> Result<String>;

    /// Delete a childless node.
    async fn delete(&self, path: &str, version: Option<u64>) -> Result<()>;

    /// Replace a node's payload, returning the new version.
    async fn set(&self, path: &str, data: Bytes, version: Option<u64>) -> Result<u64>;

    /// Apply every op or none of them.
    async fn multi(&self, ops: Vec<Op>) -> Result<Vec<OpResult>>;

    /// Receive change events from now on.
    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StoreEvent>;
}

/// Check that `path` is absolute with no empty segments.
pub fn validate_path(path: &str) -> Result<()> {
    if path == "/" {
        return Ok(());
    }
    if !path.starts_with('/') || path.ends_with('/') || path.contains("//") {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Parent of a non-root path.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Join a child name onto a parent path.
pub fn join(parent: &str, child: &str) -> String {
    if parent == "/" {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("/").is_ok());
        assert!(validate_path("/a/b").is_ok());
        assert!(validate_path("a/b").is_err());
        assert!(validate_path("/a/").is_err());
        assert!(validate_path("/a//b").is_err());
        assert!(validate_path("").is_err());
    }

    #[test]
    fn test_parent_and_join() {
        assert_eq!(parent("/"), None);
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/a/b/c"), Some("/a/b"));
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a/b", "c"), "/a/b/c");
    }
}
