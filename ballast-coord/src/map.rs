//! Keyed map stored as children of one directory node.
//!
//! Each entry lives at `{dir}/mn-{key}`. Keys must be non-empty and must not
//! contain `/`, so every entry is a direct child of the directory.

use bytes::Bytes;
use tracing::warn;

use crate::adapter::{PutOutcome, StateAdapter};
use crate::error::{AdapterError, AdapterResult};
use crate::store::{join, CreateMode};

const ENTRY_PREFIX: &str = "mn-";

#[derive(Debug, Clone)]
pub struct DistributedMap {
    adapter: StateAdapter,
    dir: String,
}

impl DistributedMap {
    /// Open the map rooted at `dir`, creating the directory if needed.
    pub async fn open(adapter: StateAdapter, dir: impl Into<String>) -> AdapterResult<Self> {
        let dir = dir.into();
        adapter
            .make_path(&dir, Bytes::new(), CreateMode::Persistent, true)
            .await?;
        Ok(Self { adapter, dir })
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> AdapterResult<String> {
        if key.is_empty() || key.contains('/') {
            return Err(AdapterError::InvalidKey(key.to_string()));
        }
        Ok(join(&self.dir, &format!("{}{}", ENTRY_PREFIX, key)))
    }

    /// Insert or overwrite an entry.
    pub async fn put(&self, key: &str, data: Bytes) -> AdapterResult<()> {
        let path = self.entry_path(key)?;
        self.adapter
            .make_path(&path, data, CreateMode::Persistent, false)
            .await?;
        Ok(())
    }

    /// Insert only if absent; `true` when this call created the entry.
    pub async fn put_if_absent(&self, key: &str, data: Bytes) -> AdapterResult<bool> {
        let path = self.entry_path(key)?;
        let outcome = self
            .adapter
            .make_path(&path, data, CreateMode::Persistent, true)
            .await?;
        Ok(outcome == PutOutcome::Created)
    }

    pub async fn get(&self, key: &str) -> AdapterResult<Option<Bytes>> {
        let path = self.entry_path(key)?;
        Ok(self.adapter.get_data(&path).await?.map(|d| d.data))
    }

    pub async fn contains(&self, key: &str) -> AdapterResult<bool> {
        let path = self.entry_path(key)?;
        self.adapter.has_data(&path).await
    }

    pub async fn size(&self) -> AdapterResult<usize> {
        Ok(self.adapter.list_data(&self.dir).await?.len())
    }

    /// Remove an entry; `false` if there was none.
    ///
    /// Entries written before key validation existed may have children; those
    /// are removed together with the entry.
    pub async fn remove(&self, key: &str) -> AdapterResult<bool> {
        let path = self.entry_path(key)?;
        match self.adapter.remove_data(&path, None).await {
            Ok(()) => Ok(true),
            Err(AdapterError::NoNode(_)) => Ok(false),
            Err(AdapterError::NotEmpty(_)) => {
                warn!(path = %path, "Cleaning malformed map entry");
                self.adapter.remove_tree(&path).await
            }
            Err(e) => Err(e),
        }
    }

    /// Remove every entry, keeping the directory.
    pub async fn clear(&self) -> AdapterResult<()> {
        for child in self.adapter.list_data(&self.dir).await? {
            self.adapter.remove_tree(&join(&self.dir, &child)).await?;
        }
        Ok(())
    }

    /// Entry keys in lexicographic order.
    pub async fn keys(&self) -> AdapterResult<Vec<String>> {
        Ok(self
            .adapter
            .list_data(&self.dir)
            .await?
            .into_iter()
            .filter_map(|child| child.strip_prefix(ENTRY_PREFIX).map(str::to_string))
            .collect())
    }
}
