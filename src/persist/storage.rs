//! Durable Storage Module
//!
//! Single-slot string storage backends for cache snapshots.

use std::collections::HashMap;
use std::fmt::Debug;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{CacheError, Result};

// == Durable Store ==
/// A string key/value store that survives process restarts.
///
/// Backends enforce a byte quota; a write that would exceed it fails with
/// [`CacheError::Storage`] and leaves the previous value in place.
pub trait DurableStore: Send + Sync + Debug {
    /// Returns the stored value, or `None` if the slot is empty.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Empties the slot. Removing an empty slot is not an error.
    fn remove_item(&self, key: &str) -> Result<()>;
}

fn quota_exceeded(needed: usize, quota: usize) -> CacheError {
    CacheError::Storage(format!(
        "quota exceeded: {} bytes needed, {} bytes allowed",
        needed, quota
    ))
}

// == Memory Store ==
/// In-process store, mainly for tests and ephemeral deployments.
#[derive(Debug)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
    quota: usize,
}

impl MemoryStore {
    pub fn new(quota: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            quota,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.items
            .lock()
            .map_err(|_| CacheError::Storage("memory store lock poisoned".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl DurableStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.lock()?;
        let others: usize = items
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum();
        let needed = others + key.len() + value.len();
        if needed > self.quota {
            return Err(quota_exceeded(needed, self.quota));
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

// == File Store ==
/// Stores each slot as `<dir>/<key>.json`.
///
/// Each write goes to its own temporary file in the same directory, which is
/// then renamed over the slot. A crash mid-write leaves the previous snapshot
/// intact, and concurrent writers never share a temporary path.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    quota: usize,
}

impl FileStore {
    /// Opens (and creates if needed) the storage directory.
    pub fn new(dir: impl Into<PathBuf>, quota: usize) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, quota })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(CacheError::Storage(format!("invalid slot name: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl DurableStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.slot_path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(&path)?))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        if value.len() > self.quota {
            return Err(quota_exceeded(value.len(), self.quota));
        }

        let path = self.slot_path(key)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|err| CacheError::from(err.error))?;
        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.slot_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
