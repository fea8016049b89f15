//! Garbage Collection Task
//!
//! Background task that periodically removes entries past their gc time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::QueryCache;

/// Spawns a background task that periodically collects unused cache entries.
///
/// The task sleeps for `interval_secs` between runs and holds the write lock
/// only while collecting.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_gc_task(cache: Arc<RwLock<QueryCache>>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting garbage collection task with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = {
                let mut cache_guard = cache.write().await;
                cache_guard.collect_garbage()
            };

            if removed > 0 {
                info!("Garbage collection: removed {} unused entries", removed);
            } else {
                debug!("Garbage collection: nothing to remove");
            }
        }
    })
}
