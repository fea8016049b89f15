//! Snapshot Module
//!
//! Flushes the query cache to a durable slot and restores it on start-up.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, QueryKey};
use crate::error::{CacheError, Result};
use crate::persist::revive::{encode_record, revive, RevivalMode};
use crate::persist::DurableStore;
use crate::record::Value;

// == Persist Options ==
#[derive(Debug, Clone)]
pub struct PersistOptions {
    /// Name of the durable slot
    pub key: String,
    /// Snapshots written under a different buster are discarded on load
    pub buster: String,
    /// Snapshots older than this are discarded on load
    pub max_age: Duration,
    /// Encoding used when saving
    pub mode: RevivalMode,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            key: "query-cache".to_string(),
            buster: String::new(),
            max_age: Duration::from_secs(24 * 60 * 60),
            mode: RevivalMode::Heuristic,
        }
    }
}

// == Wire Format ==
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    #[serde(default)]
    buster: String,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
    /// Absent in snapshots that predate tagging
    #[serde(default = "legacy_encoding")]
    encoding: RevivalMode,
    entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotEntry {
    key: QueryKey,
    data: serde_json::Value,
    updated_at: DateTime<Utc>,
    /// Milliseconds
    stale_time: u64,
    /// Milliseconds
    gc_time: u64,
}

fn legacy_encoding() -> RevivalMode {
    RevivalMode::Heuristic
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// == Snapshot Persister ==
/// Serializes cache entries into one durable slot and revives them again.
///
/// Clones share one slot lock, so at most one save or clear runs against the
/// slot at a time.
#[derive(Debug, Clone)]
pub struct SnapshotPersister {
    store: Arc<dyn DurableStore>,
    options: PersistOptions,
    slot: Arc<Mutex<()>>,
}

impl SnapshotPersister {
    pub fn new(store: Arc<dyn DurableStore>, options: PersistOptions) -> Self {
        Self {
            store,
            options,
            slot: Arc::new(Mutex::new(())),
        }
    }

    pub fn options(&self) -> &PersistOptions {
        &self.options
    }

    fn lock_slot(&self) -> Result<MutexGuard<'_, ()>> {
        self.slot
            .lock()
            .map_err(|_| CacheError::Storage("snapshot slot lock poisoned".to_string()))
    }

    // == Save ==
    /// Writes every entry to the durable slot, replacing the previous snapshot.
    ///
    /// Returns the number of bytes written. Fails with
    /// [`CacheError::Storage`] if the store rejects the write. Blocks while
    /// another save holds the slot.
    pub fn save(&self, entries: &BTreeMap<QueryKey, CacheEntry>) -> Result<usize> {
        let _slot = self.lock_slot()?;
        self.write(entries)
    }

    /// Takes the entries with `take` and writes them, holding the slot
    /// throughout.
    ///
    /// Saves therefore land in the order their entries were taken, and an
    /// older snapshot can never replace a newer one. Returns the number of
    /// entries and bytes written.
    pub fn save_with<F>(&self, take: F) -> Result<(usize, usize)>
    where
        F: FnOnce() -> BTreeMap<QueryKey, CacheEntry>,
    {
        let _slot = self.lock_slot()?;
        let entries = take();
        let bytes = self.write(&entries)?;
        Ok((entries.len(), bytes))
    }

    fn write(&self, entries: &BTreeMap<QueryKey, CacheEntry>) -> Result<usize> {
        let snapshot = Snapshot {
            buster: self.options.buster.clone(),
            saved_at: Some(Utc::now()),
            encoding: self.options.mode,
            entries: entries
                .iter()
                .map(|(key, entry)| SnapshotEntry {
                    key: key.clone(),
                    data: encode_record(&entry.data, self.options.mode),
                    updated_at: entry.updated_at,
                    stale_time: duration_ms(entry.stale_time),
                    gc_time: duration_ms(entry.gc_time),
                })
                .collect(),
        };

        let blob = serde_json::to_string(&snapshot)
            .map_err(|err| CacheError::Internal(format!("snapshot encoding failed: {}", err)))?;
        self.store.set_item(&self.options.key, &blob)?;

        debug!(
            "Saved {} entries ({} bytes) to slot '{}'",
            entries.len(),
            blob.len(),
            self.options.key
        );
        Ok(blob.len())
    }

    // == Load ==
    /// Restores the last snapshot.
    ///
    /// Never fails: a missing, unreadable, corrupt, busted or expired
    /// snapshot yields an empty map. Faults are logged as warnings.
    pub fn load(&self) -> BTreeMap<QueryKey, CacheEntry> {
        match self.try_load() {
            Ok(Some(entries)) => {
                info!(
                    "Restored {} entries from slot '{}'",
                    entries.len(),
                    self.options.key
                );
                entries
            }
            Ok(None) => BTreeMap::new(),
            Err(err) => {
                warn!(
                    "Starting with a cold cache, snapshot '{}' unusable: {}",
                    self.options.key, err
                );
                BTreeMap::new()
            }
        }
    }

    /// Restores the last snapshot, reporting faults to the caller.
    ///
    /// `Ok(None)` means there was nothing usable to restore.
    pub fn try_load(&self) -> Result<Option<BTreeMap<QueryKey, CacheEntry>>> {
        let Some(blob) = self.store.get_item(&self.options.key)? else {
            debug!("No snapshot in slot '{}'", self.options.key);
            return Ok(None);
        };

        let snapshot: Snapshot = serde_json::from_str(&blob)?;

        if snapshot.buster != self.options.buster {
            info!(
                "Discarding snapshot with buster '{}', expected '{}'",
                snapshot.buster, self.options.buster
            );
            self.discard();
            return Ok(None);
        }

        if let Some(saved_at) = snapshot.saved_at {
            let age = Utc::now().signed_duration_since(saved_at);
            let too_old = age
                .to_std()
                .map(|age| age > self.options.max_age)
                .unwrap_or(false);
            if too_old {
                info!("Discarding snapshot saved at {}", saved_at);
                self.discard();
                return Ok(None);
            }
        }

        let now = Utc::now();
        let mut entries = BTreeMap::new();
        for stored in snapshot.entries {
            let data = match revive(stored.data, snapshot.encoding) {
                Value::Object(record) => record,
                _ => {
                    warn!("Skipping snapshot entry {} with non-record data", stored.key);
                    continue;
                }
            };
            let mut entry = CacheEntry::new_at(
                stored.key.clone(),
                data,
                Duration::from_millis(stored.stale_time),
                Duration::from_millis(stored.gc_time),
                now,
            );
            entry.updated_at = stored.updated_at;
            entries.insert(stored.key, entry);
        }

        Ok(Some(entries))
    }

    /// Empties the durable slot.
    pub fn clear(&self) -> Result<()> {
        let _slot = self.lock_slot()?;
        self.store.remove_item(&self.options.key)
    }

    fn discard(&self) {
        if let Err(err) = self.clear() {
            warn!("Failed to remove snapshot '{}': {}", self.options.key, err);
        }
    }
}
