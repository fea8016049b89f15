//! Query Cache - deep record merging and durable cache revival
//!
//! Combines freshly fetched partial records with cached ones without losing
//! fields, and persists the cache to a durable slot with timestamp revival on
//! reload.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod merge;
pub mod models;
pub mod persist;
pub mod record;
pub mod tasks;

pub use api::AppState;
pub use cache::{prefetch, CacheEntry, PrefetchOutcome, QueryCache, QueryKey};
pub use config::Config;
pub use error::{CacheError, Result};
pub use merge::{merge, merge_pair};
pub use persist::{DurableStore, FileStore, MemoryStore, PersistOptions, RevivalMode, SnapshotPersister};
pub use record::{Record, Value};
pub use tasks::{flush_snapshot, spawn_gc_task, spawn_persist_task};
