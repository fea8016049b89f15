//! API Handlers
//!
//! HTTP request handlers for each query cache endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use tokio::sync::RwLock;
use tracing::warn;

use crate::cache::{QueryCache, QueryKey};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::merge::merge;
use crate::models::{
    DeleteResponse, HealthResponse, MergeRequest, MergeResponse, QueryResponse, SnapshotResponse,
    StatsResponse, StoreQueryRequest, StoreResponse,
};
use crate::persist::{DurableStore, FileStore, MemoryStore, PersistOptions, SnapshotPersister};
use crate::tasks::flush_snapshot;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live query cache
    pub cache: Arc<RwLock<QueryCache>>,
    /// Durable snapshot slot for the cache
    pub persister: SnapshotPersister,
}

impl AppState {
    /// Creates a new AppState from a cache and its persister.
    pub fn new(cache: QueryCache, persister: SnapshotPersister) -> Self {
        Self {
            cache: Arc::new(RwLock::new(cache)),
            persister,
        }
    }

    /// Creates an AppState whose snapshots live in process memory.
    pub fn in_memory(cache: QueryCache) -> Self {
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::default());
        Self::new(cache, SnapshotPersister::new(store, PersistOptions::default()))
    }

    /// Creates an AppState from configuration and restores the last snapshot.
    ///
    /// If the snapshot directory cannot be opened the server keeps running
    /// with an in-memory slot.
    pub fn from_config(config: &Config) -> Self {
        let store: Arc<dyn DurableStore> =
            match FileStore::new(&config.snapshot_dir, config.storage_quota) {
                Ok(store) => Arc::new(store),
                Err(err) => {
                    warn!(
                        "Snapshot directory {} unavailable, snapshots will not survive restarts: {}",
                        config.snapshot_dir.display(),
                        err
                    );
                    Arc::new(MemoryStore::new(config.storage_quota))
                }
            };
        let persister = SnapshotPersister::new(store, config.persist_options());

        let mut cache = QueryCache::new(
            config.max_entries,
            config.default_stale_time(),
            config.default_gc_time(),
        );
        cache.hydrate(persister.load());

        Self::new(cache, persister)
    }
}

/// Handler for PUT /queries
///
/// Merges the fetched record into the cached one and returns the result.
pub async fn store_query_handler(
    State(state): State<AppState>,
    Json(req): Json<StoreQueryRequest>,
) -> Result<Json<StoreResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let key = req.query_key();
    let mut cache = state.cache.write().await;
    let entry = cache.merge_fetched(
        key.clone(),
        req.data,
        req.stale_time_ms.map(Duration::from_millis),
        req.gc_time_ms.map(Duration::from_millis),
    )?;

    Ok(Json(StoreResponse::new(key, entry.data.clone())))
}

/// Handler for GET /queries/*key
pub async fn get_query_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<QueryResponse>> {
    let key = QueryKey::from_path(&path);

    // Write lock: reads update LRU order and statistics
    let mut cache = state.cache.write().await;
    let entry = cache.get(&key)?;

    Ok(Json(QueryResponse::from_entry(entry)))
}

/// Handler for DELETE /queries/*key
pub async fn delete_query_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let key = QueryKey::from_path(&path);

    let mut cache = state.cache.write().await;
    cache.remove(&key)?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /merge
///
/// Merges the request's records left to right; the cache is not involved.
pub async fn merge_handler(Json(req): Json<MergeRequest>) -> Json<MergeResponse> {
    Json(MergeResponse {
        result: merge(&req.target, &req.sources),
    })
}

/// Handler for POST /snapshot
pub async fn snapshot_handler(State(state): State<AppState>) -> Result<Json<SnapshotResponse>> {
    let (entries, bytes) = flush_snapshot(&state.cache, &state.persister).await?;
    Ok(Json(SnapshotResponse::new(entries, bytes)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.cache.read().await;
    Json(StatsResponse::from(cache.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
