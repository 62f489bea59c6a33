use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::fs::operations::{overwrite_locked, read_locked};

/// Raw key/value contract. Every mutation is applied as a whole, there is no partial write of a
/// multi-key update.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn get_all(&self) -> Result<Map<String, Value>>;

    async fn set(&mut self, entries: Vec<(String, Value)>) -> Result<()>;

    async fn remove(&mut self, keys: &[&str]) -> Result<()>;

    async fn clear(&mut self) -> Result<()>;
}

/// Keeps the whole store as a single JSON object on disk and mirrors it in memory. The tracker is
/// the only writer, so reads are served from memory and every write rewrites the file.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl JsonFileStore {
    pub async fn open(path: PathBuf) -> Result<Self> {
        let entries = Self::read(&path).await?;
        debug!("Opened store {path:?} with {} keys", entries.len());
        Ok(Self { path, entries })
    }

    /// Reads the document without taking ownership of it, for use by the CLI while the daemon is
    /// running.
    pub async fn read(path: &Path) -> Result<Map<String, Value>> {
        let Some(content) = read_locked(path).await? else {
            return Ok(Map::new());
        };
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                // A torn write after a crash should not keep the daemon from starting.
                warn!("Store {path:?} is not a json object, starting empty: {e}");
                Ok(Map::new())
            }
        }
    }

    /// Writes `next` to disk and only then makes it the in-memory state, so a failed write leaves
    /// both sides at the previous document.
    async fn commit(&mut self, next: Map<String, Value>) -> Result<()> {
        let content = serde_json::to_vec_pretty(&next)?;
        overwrite_locked(&self.path, &content).await?;
        self.entries = next;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).cloned())
    }

    async fn get_all(&self) -> Result<Map<String, Value>> {
        Ok(self.entries.clone())
    }

    async fn set(&mut self, entries: Vec<(String, Value)>) -> Result<()> {
        let mut next = self.entries.clone();
        next.extend(entries);
        self.commit(next).await
    }

    async fn remove(&mut self, keys: &[&str]) -> Result<()> {
        if !keys.iter().any(|key| self.entries.contains_key(*key)) {
            return Ok(());
        }
        let mut next = self.entries.clone();
        for key in keys {
            next.remove(*key);
        }
        self.commit(next).await
    }

    async fn clear(&mut self) -> Result<()> {
        self.commit(Map::new()).await
    }
}

#[cfg(test)]
pub use memory::MemoryStore;
