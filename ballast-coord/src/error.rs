//! Coordination store and adapter error types.

use ballast::PlacementError;
use thiserror::Error;

/// Raw failures reported by a coordination store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Path does not exist
    #[error("No node: {0}")]
    NoNode(String),

    /// Path already exists
    #[error("Node already exists: {0}")]
    NodeExists(String),

    /// Conditional write against a version that is no longer current
    #[error("Bad version at {path}: expected {expected}, found {actual}")]
    BadVersion {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// Delete of a node that still has children
    #[error("Node not empty: {0}")]
    NotEmpty(String),

    /// Ephemeral nodes cannot have children
    #[error("Ephemeral node cannot have children: {0}")]
    EphemeralParent(String),

    /// Malformed path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Backend failure not covered above
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn is_no_node(&self) -> bool {
        matches!(self, StoreError::NoNode(_))
    }

    pub fn is_node_exists(&self) -> bool {
        matches!(self, StoreError::NodeExists(_))
    }

    pub fn is_bad_version(&self) -> bool {
        matches!(self, StoreError::BadVersion { .. })
    }
}

/// Store failures translated into what the decision layer acts on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Version or existence conflict; retry against a fresh snapshot
    #[error("Conflict at {path}: {detail}")]
    Conflict { path: String, detail: String },

    /// A write targeted a path that does not exist
    #[error("No such path: {0}")]
    NoNode(String),

    /// A delete targeted a path that still has children
    #[error("Path not empty: {0}")]
    NotEmpty(String),

    /// Map key is empty or contains the path separator
    #[error("Unsupported key format: {0:?}")]
    InvalidKey(String),

    /// Stored payload could not be decoded
    #[error("Malformed data at {path}: {detail}")]
    Malformed { path: String, detail: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

impl AdapterError {
    /// Conflicts clear up once the caller re-reads and decides again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdapterError::Conflict { .. })
    }

    /// Store path the error refers to, when there is one.
    pub fn path(&self) -> Option<&str> {
        match self {
            AdapterError::Conflict { path, .. } | AdapterError::Malformed { path, .. } => {
                Some(path)
            }
            AdapterError::NoNode(path) | AdapterError::NotEmpty(path) => Some(path),
            AdapterError::InvalidKey(_) | AdapterError::Store(_) => None,
        }
    }
}

impl From<AdapterError> for PlacementError {
    fn from(err: AdapterError) -> Self {
        let path = err.path().unwrap_or_default().to_string();
        let detail = match err {
            AdapterError::Conflict { detail, .. } => detail,
            other => other.to_string(),
        };
        PlacementError::AdapterConflict { path, detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_retryable() {
        let conflict = AdapterError::Conflict {
            path: "/a".to_string(),
            detail: "version 3".to_string(),
        };
        assert!(conflict.is_retryable());
        assert!(!AdapterError::NoNode("/a".to_string()).is_retryable());
        assert!(!AdapterError::Store(StoreError::Backend("down".to_string())).is_retryable());
    }

    #[test]
    fn test_into_placement_error() {
        let err: PlacementError = AdapterError::Conflict {
            path: "/collections/x".to_string(),
            detail: "bad version".to_string(),
        }
        .into();
        assert_eq!(
            err,
            PlacementError::AdapterConflict {
                path: "/collections/x".to_string(),
                detail: "bad version".to_string(),
            }
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::BadVersion {
            path: "/cluster_epoch".to_string(),
            expected: 2,
            actual: 5,
        };
        assert_eq!(
            err.to_string(),
            "Bad version at /cluster_epoch: expected 2, found 5"
        );
        assert!(err.is_bad_version());
    }
}
