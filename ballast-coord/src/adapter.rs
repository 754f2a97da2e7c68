//! State adapter over a [`CoordinationStore`].
//!
//! Translates raw store failures into outcomes the decision layer can act on.
//! It holds no placement logic.
//!
//! | Store condition            | Adapter outcome                         |
//! |----------------------------|-----------------------------------------|
//! | no node on read/exists/list| `None` / `false` / empty listing        |
//! | bad version on write       | [`AdapterError::Conflict`] (retryable)  |
//! | node exists on create      | [`PutOutcome::AlreadyPresent`]          |
//! | no node on write/delete    | [`AdapterError::NoNode`]                |
//! | children on delete         | [`AdapterError::NotEmpty`]              |

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{AdapterError, AdapterResult, StoreError};
use crate::store::{join, validate_path, CoordinationStore, CreateMode, Op, OpResult, VersionedData};

/// Result of an idempotent create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The node did not exist and was created
    Created,
    /// The node already existed and was left untouched
    AlreadyPresent,
    /// The node already existed and its payload was overwritten
    Replaced,
}

impl PutOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, PutOutcome::Created)
    }
}

fn translate(err: StoreError) -> AdapterError {
    match err {
        StoreError::BadVersion {
            path,
            expected,
            actual,
        } => AdapterError::Conflict {
            path,
            detail: format!("expected version {}, found {}", expected, actual),
        },
        StoreError::NoNode(path) => AdapterError::NoNode(path),
        StoreError::NotEmpty(path) => AdapterError::NotEmpty(path),
        other => AdapterError::Store(other),
    }
}

/// Decision-domain view of a coordination store.
#[derive(Clone)]
pub struct StateAdapter {
    store: Arc<dyn CoordinationStore>,
}

impl std::fmt::Debug for StateAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateAdapter").finish_non_exhaustive()
    }
}

impl StateAdapter {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Underlying store, for subscriptions and raw access.
    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    /// Versioned payload, or `None` when the node is absent.
    pub async fn get_data(&self, path: &str) -> AdapterResult<Option<VersionedData>> {
        match self.store.get(path).await {
            Ok(data) => Ok(Some(data)),
            Err(StoreError::NoNode(_)) => Ok(None),
            Err(e) => Err(translate(e)),
        }
    }

    /// JSON object stored at `path`; empty when the node is absent or empty.
    pub async fn get_json(&self, path: &str) -> AdapterResult<Map<String, Value>> {
        Ok(self.read_json(path).await?.unwrap_or_default())
    }

    /// Decode the JSON payload at `path`; `None` when absent or empty.
    pub async fn read_json<T: DeserializeOwned>(&self, path: &str) -> AdapterResult<Option<T>> {
        let Some(data) = self.get_data(path).await? else {
            return Ok(None);
        };
        if data.data.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&data.data)
            .map(Some)
            .map_err(|e| AdapterError::Malformed {
                path: path.to_string(),
                detail: e.to_string(),
            })
    }

    pub async fn has_data(&self, path: &str) -> AdapterResult<bool> {
        self.store.exists(path).await.map_err(translate)
    }

    /// Child names; an absent parent lists as empty.
    pub async fn list_data(&self, path: &str) -> AdapterResult<Vec<String>> {
        match self.store.list_children(path).await {
            Ok(children) => Ok(children),
            Err(StoreError::NoNode(_)) => Ok(Vec::new()),
            Err(e) => Err(translate(e)),
        }
    }

    /// Create a node under an existing parent.
    pub async fn create_data(
        &self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
    ) -> AdapterResult<PutOutcome> {
        match self.store.create(path, data, mode).await {
            Ok(_) => Ok(PutOutcome::Created),
            Err(StoreError::NodeExists(_)) => {
                debug!(path, "Node already present");
                Ok(PutOutcome::AlreadyPresent)
            }
            Err(e) => Err(translate(e)),
        }
    }

    /// Create `path` and any missing persistent ancestors.
    ///
    /// When the leaf already exists it is left alone if `fail_on_exists` is
    /// set, otherwise its payload is overwritten.
    pub async fn make_path(
        &self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
        fail_on_exists: bool,
    ) -> AdapterResult<PutOutcome> {
        validate_path(path).map_err(translate)?;

        let mut ancestor = String::new();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for segment in segments.iter().take(segments.len().saturating_sub(1)) {
            ancestor.push('/');
            ancestor.push_str(segment);
            self.create_data(&ancestor, Bytes::new(), CreateMode::Persistent)
                .await?;
        }

        if path == "/" {
            return Ok(PutOutcome::AlreadyPresent);
        }
        match self.create_data(path, data.clone(), mode).await? {
            PutOutcome::AlreadyPresent if !fail_on_exists => {
                self.set_data(path, data, None).await?;
                Ok(PutOutcome::Replaced)
            }
            outcome => Ok(outcome),
        }
    }

    /// Conditional write; a stale `version` is a retryable conflict.
    pub async fn set_data(
        &self,
        path: &str,
        data: Bytes,
        version: Option<u64>,
    ) -> AdapterResult<u64> {
        self.store.set(path, data, version).await.map_err(|e| {
            let err = translate(e);
            if err.is_retryable() {
                debug!(path, error = %err, "Write conflict");
            }
            err
        })
    }

    /// Conditional delete of a childless node.
    pub async fn remove_data(&self, path: &str, version: Option<u64>) -> AdapterResult<()> {
        self.store.delete(path, version).await.map_err(translate)
    }

    /// Delete `path` and everything below it; `false` if it was absent.
    pub async fn remove_tree(&self, path: &str) -> AdapterResult<bool> {
        if !self.has_data(path).await? {
            return Ok(false);
        }

        // Breadth-first listing, deleted in reverse so children go first
        let mut order = vec![path.to_string()];
        let mut next = 0;
        while next < order.len() {
            let current = order[next].clone();
            for child in self.list_data(&current).await? {
                order.push(join(&current, &child));
            }
            next += 1;
        }

        for node in order.iter().rev() {
            match self.store.delete(node, None).await {
                Ok(()) | Err(StoreError::NoNode(_)) => {}
                Err(e) => return Err(translate(e)),
            }
        }
        debug!(path, removed = order.len(), "Removed subtree");
        Ok(true)
    }

    /// Atomic batch. Any version or existence clash is a conflict.
    pub async fn multi(&self, ops: Vec<Op>) -> AdapterResult<Vec<OpResult>> {
        self.store.multi(ops).await.map_err(|e| match e {
            StoreError::NodeExists(path) => AdapterError::Conflict {
                path,
                detail: "node already exists".to_string(),
            },
            other => translate(other),
        })
    }
}
