//! In-memory coordination store.
//!
//! Reference implementation of [`CoordinationStore`] used by tests and by
//! single-process deployments. Handles created with [`MemoryStore::with_session`]
//! share one tree, so ephemeral ownership and session expiry can be exercised
//! without a real ensemble.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use crate::error::{Result, StoreError};
use crate::store::{
    parent, validate_path, CoordinationStore, CreateMode, Op, OpResult, StoreEvent, VersionedData,
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    version: u64,
    mode: CreateMode,
    owner: Option<String>,
}

impl Entry {
    fn root() -> Self {
        Self {
            data: Bytes::new(),
            version: 0,
            mode: CreateMode::Persistent,
            owner: None,
        }
    }

    fn to_versioned(&self) -> VersionedData {
        VersionedData {
            version: self.version,
            data: self.data.clone(),
            mode: self.mode,
            owner: self.owner.clone(),
        }
    }
}

type Tree = BTreeMap<String, Entry>;

#[derive(Debug)]
struct Shared {
    tree: RwLock<Tree>,
    events: broadcast::Sender<StoreEvent>,
}

/// Shared in-memory tree with per-handle session identity.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    session: String,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store containing only the root node.
    pub fn new() -> Self {
        let mut tree = Tree::new();
        tree.insert("/".to_string(), Entry::root());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                tree: RwLock::new(tree),
                events,
            }),
            session: "session-0".to_string(),
        }
    }

    /// Another handle on the same tree, owning ephemerals as `session`.
    pub fn with_session(&self, session: impl Into<String>) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            session: session.into(),
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// Number of nodes, not counting the root.
    pub fn node_count(&self) -> usize {
        self.shared.tree.read().len() - 1
    }

    /// Drop every ephemeral node owned by `session`; returns how many went.
    pub fn expire_session(&self, session: &str) -> usize {
        let removed: Vec<String> = {
            let mut tree = self.shared.tree.write();
            let owned: Vec<String> = tree
                .iter()
                .filter(|(_, e)| e.mode == CreateMode::Ephemeral)
                .filter(|(_, e)| e.owner.as_deref() == Some(session))
                .map(|(path, _)| path.clone())
                .collect();
            for path in &owned {
                tree.remove(path);
            }
            owned
        };

        info!(session, removed = removed.len(), "Expired session");
        for path in &removed {
            self.publish(StoreEvent::Deleted(path.clone()));
        }
        removed.len()
    }

    fn publish(&self, event: StoreEvent) {
        // No receivers is fine
        let _ = self.shared.events.send(event);
    }
}

fn child_names(tree: &Tree, path: &str) -> Vec<String> {
    let prefix = if path == "/" {
        "/".to_string()
    } else {
        format!("{}/", path)
    };
    tree.range(prefix.clone()..)
        .take_while(|(key, _)| key.starts_with(&prefix))
        .filter_map(|(key, _)| {
            let rest = &key[prefix.len()..];
            (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
        })
        .collect()
}

fn check_version(path: &str, entry: &Entry, expected: Option<u64>) -> Result<()> {
    match expected {
        Some(expected) if expected != entry.version => Err(StoreError::BadVersion {
            path: path.to_string(),
            expected,
            actual: entry.version,
        }),
        _ => Ok(()),
    }
}

fn create_in(
    tree: &mut Tree,
    path: &str,
    data: Bytes,
    mode: CreateMode,
    session: &str,
) -> Result<String> {
    validate_path(path)?;
    if tree.contains_key(path) {
        return Err(StoreError::NodeExists(path.to_string()));
    }
    let parent_path = parent(path).ok_or_else(|| StoreError::NodeExists(path.to_string()))?;
    let parent_entry = tree
        .get(parent_path)
        .ok_or_else(|| StoreError::NoNode(path.to_string()))?;
    if parent_entry.mode == CreateMode::Ephemeral {
        return Err(StoreError::EphemeralParent(parent_path.to_string()));
    }

    let owner = (mode == CreateMode::Ephemeral).then(|| session.to_string());
    tree.insert(
        path.to_string(),
        Entry {
            data,
            version: 0,
            mode,
            owner,
        },
    );
    Ok(path.to_string())
}

fn set_in(tree: &mut Tree, path: &str, data: Bytes, version: Option<u64>) -> Result<u64> {
    validate_path(path)?;
    let entry = tree
        .get_mut(path)
        .ok_or_else(|| StoreError::NoNode(path.to_string()))?;
    check_version(path, entry, version)?;
    entry.data = data;
    entry.version += 1;
    Ok(entry.version)
}

fn delete_in(tree: &mut Tree, path: &str, version: Option<u64>) -> Result<()> {
    validate_path(path)?;
    if path == "/" {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let entry = tree
        .get(path)
        .ok_or_else(|| StoreError::NoNode(path.to_string()))?;
    check_version(path, entry, version)?;
    if !child_names(tree, path).is_empty() {
        return Err(StoreError::NotEmpty(path.to_string()));
    }
    tree.remove(path);
    Ok(())
}

fn apply(tree: &mut Tree, op: Op, session: &str) -> Result<(OpResult, Option<StoreEvent>)> {
    match op {
        Op::Create { path, data, mode } => {
            let created = create_in(tree, &path, data, mode, session)?;
            Ok((
                OpResult::Created(created.clone()),
                Some(StoreEvent::Created(created)),
            ))
        }
        Op::Set {
            path,
            data,
            version,
        } => {
            let version = set_in(tree, &path, data, version)?;
            Ok((
                OpResult::Set { version },
                Some(StoreEvent::DataChanged { path, version }),
            ))
        }
        Op::Delete { path, version } => {
            delete_in(tree, &path, version)?;
            Ok((OpResult::Deleted, Some(StoreEvent::Deleted(path))))
        }
        Op::Check { path, version } => {
            validate_path(&path)?;
            let entry = tree
                .get(&path)
                .ok_or_else(|| StoreError::NoNode(path.clone()))?;
            check_version(&path, entry, Some(version))?;
            Ok((OpResult::Checked, None))
        }
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<VersionedData> {
        validate_path(path)?;
        self.shared
            .tree
            .read()
            .get(path)
            .map(Entry::to_versioned)
            .ok_or_else(|| StoreError::NoNode(path.to_string()))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        validate_path(path)?;
        Ok(self.shared.tree.read().contains_key(path))
    }

    async fn list_children(&self, path: &str) -> Result<Vec<String>> {
        validate_path(path)?;
        let tree = self.shared.tree.read();
        if !tree.contains_key(path) {
            return Err(StoreError::NoNode(path.to_string()));
        }
        Ok(child_names(&tree, path))
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn create(&self, path: &str, data: Bytes, mode: CreateMode) -> Result<String> {
        let created = create_in(&mut self.shared.tree.write(), path, data, mode, &self.session)?;
        debug!(?mode, "Created node");
        self.publish(StoreEvent::Created(created.clone()));
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn delete(&self, path: &str, version: Option<u64>) -> Result<()> {
        delete_in(&mut self.shared.tree.write(), path, version)?;
        debug!("Deleted node");
        self.publish(StoreEvent::Deleted(path.to_string()));
        Ok(())
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn set(&self, path: &str, data: Bytes, version: Option<u64>) -> Result<u64> {
        let new_version = set_in(&mut self.shared.tree.write(), path, data, version)?;
        debug!(version = new_version, "Set node data");
        self.publish(StoreEvent::DataChanged {
            path: path.to_string(),
            version: new_version,
        });
        Ok(new_version)
    }

    #[instrument(skip(self, ops), fields(ops = ops.len()))]
    async fn multi(&self, ops: Vec<Op>) -> Result<Vec<OpResult>> {
        let mut results = Vec::with_capacity(ops.len());
        let mut events = Vec::new();
        {
            let mut tree = self.shared.tree.write();
            let mut scratch = tree.clone();
            for op in ops {
                let (result, event) = apply(&mut scratch, op, &self.session)?;
                results.push(result);
                events.extend(event);
            }
            *tree = scratch;
        }

        debug!(applied = results.len(), "Applied batch");
        for event in events {
            self.publish(event);
        }
        Ok(results)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.shared.events.subscribe()
    }
}
