//! Persistence Task
//!
//! Flushes the query cache to its durable slot whenever it has changed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::QueryCache;
use crate::error::{CacheError, Result};
use crate::persist::SnapshotPersister;

/// Writes the current cache contents to the durable slot.
///
/// Returns the number of entries and bytes written.
pub async fn flush_snapshot(
    cache: &Arc<RwLock<QueryCache>>,
    persister: &SnapshotPersister,
) -> Result<(usize, usize)> {
    let (_, entries, bytes) = write_snapshot(cache.clone(), persister.clone()).await?;
    Ok((entries, bytes))
}

/// Snapshots and saves the cache on the blocking pool.
///
/// The snapshot is taken while the persister holds the slot, so concurrent
/// flushes land in the order they read the cache. The cache read lock is
/// released before the store is written. Returns the mutation count the
/// snapshot reflects, with the entries and bytes written.
async fn write_snapshot(
    cache: Arc<RwLock<QueryCache>>,
    persister: SnapshotPersister,
) -> Result<(u64, usize, usize)> {
    tokio::task::spawn_blocking(move || -> Result<(u64, usize, usize)> {
        let mut mutations = 0;
        let (entries, bytes) = persister.save_with(|| {
            let cache_guard = cache.blocking_read();
            mutations = cache_guard.mutation_count();
            cache_guard.snapshot()
        })?;
        Ok((mutations, entries, bytes))
    })
    .await
    .map_err(|err| CacheError::Internal(format!("snapshot task failed: {}", err)))?
}

/// Spawns a background task that saves the cache after it has mutated.
///
/// Each tick compares the cache's mutation counter with the one last saved,
/// so at most one write happens per interval. Failed writes are logged and
/// retried on the next tick; they never reach request handling.
pub fn spawn_persist_task(
    cache: Arc<RwLock<QueryCache>>,
    persister: SnapshotPersister,
    interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting persistence task with interval of {} seconds",
            interval_secs
        );
        // Hydration does not count as a mutation, so a restored cache starts clean.
        let mut saved_mutations = 0;

        loop {
            tokio::time::sleep(interval).await;

            if cache.read().await.mutation_count() == saved_mutations {
                continue;
            }

            match write_snapshot(cache.clone(), persister.clone()).await {
                Ok((mutations, entries, bytes)) => {
                    saved_mutations = mutations;
                    debug!("Persisted {} entries ({} bytes)", entries, bytes);
                }
                Err(err) => warn!("Snapshot flush failed, will retry: {}", err),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryKey;
    use crate::persist::{DurableStore, FileStore, MemoryStore, PersistOptions};
    use crate::record::{record_from_json, Value};
    use serde_json::json;

    fn shared_cache() -> Arc<RwLock<QueryCache>> {
        Arc::new(RwLock::new(QueryCache::new(
            100,
            Duration::from_secs(60),
            Duration::from_secs(300),
        )))
    }

    #[tokio::test]
    async fn test_flush_snapshot_writes_entries() {
        let cache = shared_cache();
        let store = Arc::new(MemoryStore::default());
        let persister = SnapshotPersister::new(store.clone(), PersistOptions::default());
        cache
            .write()
            .await
            .set(
                QueryKey::new(["item", "1"]),
                record_from_json(json!({"title": "a"})).unwrap(),
                None,
                None,
            )
            .unwrap();

        let (entries, bytes) = flush_snapshot(&cache, &persister).await.unwrap();
        assert_eq!(entries, 1);
        assert!(bytes > 0);

        let restored = persister.load();
        assert_eq!(
            restored[&QueryKey::new(["item", "1"])].data["title"],
            Value::from("a")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_flushes_keep_the_newest_snapshot() {
        let cache = shared_cache();
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn DurableStore> =
            Arc::new(FileStore::new(dir.path(), 1024 * 1024).unwrap());
        let persister = SnapshotPersister::new(store, PersistOptions::default());

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                let persister = persister.clone();
                tokio::spawn(async move {
                    let key = QueryKey::new(["item".to_string(), i.to_string()]);
                    cache
                        .write()
                        .await
                        .set(key, Default::default(), None, None)
                        .unwrap();
                    flush_snapshot(&cache, &persister).await
                })
            })
            .collect();

        for writer in writers {
            assert!(writer.await.unwrap().is_ok());
        }
        assert_eq!(persister.load().len(), 8);
    }

    #[tokio::test]
    async fn test_persist_task_saves_only_after_mutation() {
        let cache = shared_cache();
        let store = Arc::new(MemoryStore::default());
        let persister = SnapshotPersister::new(store.clone(), PersistOptions::default());

        let handle = spawn_persist_task(cache.clone(), persister.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(store.get_item("query-cache").unwrap(), None);

        cache
            .write()
            .await
            .set(QueryKey::new(["item", "1"]), Default::default(), None, None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert_eq!(persister.load().len(), 1);
        handle.abort();
    }

    #[tokio::test]
    async fn test_persist_task_survives_storage_faults() {
        let cache = shared_cache();
        let store = Arc::new(MemoryStore::new(8));
        let persister = SnapshotPersister::new(store.clone(), PersistOptions::default());

        let handle = spawn_persist_task(cache.clone(), persister, 1);
        cache
            .write()
            .await
            .set(QueryKey::new(["item", "1"]), Default::default(), None, None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert!(!handle.is_finished(), "Task should keep running after a failed save");
        assert_eq!(store.get_item("query-cache").unwrap(), None);
        handle.abort();
    }
}
