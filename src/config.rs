//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::persist::{PersistOptions, RevivalMode};

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    /// Freshness window in milliseconds for writes that give none
    pub default_stale_time_ms: u64,
    /// Retention window in milliseconds for writes that give none
    pub default_gc_time_ms: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Garbage collection interval in seconds
    pub gc_interval: u64,
    /// Snapshot flush interval in seconds
    pub persist_interval: u64,
    /// Directory holding the snapshot slot
    pub snapshot_dir: PathBuf,
    /// Name of the snapshot slot
    pub snapshot_key: String,
    /// Snapshots written under another buster are discarded
    pub snapshot_buster: String,
    /// Maximum snapshot age in seconds
    pub snapshot_max_age: u64,
    /// Timestamp encoding for snapshots
    pub snapshot_encoding: RevivalMode,
    /// Maximum snapshot size in bytes
    pub storage_quota: usize,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `DEFAULT_STALE_TIME_MS` - Default stale time (default: 60000)
    /// - `DEFAULT_GC_TIME_MS` - Default gc time (default: 300000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `GC_INTERVAL` - Garbage collection frequency in seconds (default: 1)
    /// - `PERSIST_INTERVAL` - Snapshot flush frequency in seconds (default: 1)
    /// - `SNAPSHOT_DIR` - Snapshot directory (default: `.query-cache`)
    /// - `SNAPSHOT_KEY` - Snapshot slot name (default: `query-cache`)
    /// - `SNAPSHOT_BUSTER` - Cache buster (default: empty)
    /// - `SNAPSHOT_MAX_AGE` - Maximum snapshot age in seconds (default: 86400)
    /// - `SNAPSHOT_ENCODING` - `heuristic` or `tagged` (default: heuristic)
    /// - `STORAGE_QUOTA` - Snapshot size limit in bytes (default: 5 MiB)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            default_stale_time_ms: env_or("DEFAULT_STALE_TIME_MS", defaults.default_stale_time_ms),
            default_gc_time_ms: env_or("DEFAULT_GC_TIME_MS", defaults.default_gc_time_ms),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            gc_interval: env_or("GC_INTERVAL", defaults.gc_interval),
            persist_interval: env_or("PERSIST_INTERVAL", defaults.persist_interval),
            snapshot_dir: env_or("SNAPSHOT_DIR", defaults.snapshot_dir),
            snapshot_key: env_or("SNAPSHOT_KEY", defaults.snapshot_key),
            snapshot_buster: env_or("SNAPSHOT_BUSTER", defaults.snapshot_buster),
            snapshot_max_age: env_or("SNAPSHOT_MAX_AGE", defaults.snapshot_max_age),
            snapshot_encoding: env_or("SNAPSHOT_ENCODING", defaults.snapshot_encoding),
            storage_quota: env_or("STORAGE_QUOTA", defaults.storage_quota),
        }
    }

    pub fn default_stale_time(&self) -> Duration {
        Duration::from_millis(self.default_stale_time_ms)
    }

    pub fn default_gc_time(&self) -> Duration {
        Duration::from_millis(self.default_gc_time_ms)
    }

    /// Snapshot options derived from this configuration.
    pub fn persist_options(&self) -> PersistOptions {
        PersistOptions {
            key: self.snapshot_key.clone(),
            buster: self.snapshot_buster.clone(),
            max_age: Duration::from_secs(self.snapshot_max_age),
            mode: self.snapshot_encoding,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_stale_time_ms: 60_000,
            default_gc_time_ms: 300_000,
            server_port: 3000,
            gc_interval: 1,
            persist_interval: 1,
            snapshot_dir: PathBuf::from(".query-cache"),
            snapshot_key: "query-cache".to_string(),
            snapshot_buster: String::new(),
            snapshot_max_age: 24 * 60 * 60,
            snapshot_encoding: RevivalMode::Heuristic,
            storage_quota: 5 * 1024 * 1024,
        }
    }
}
