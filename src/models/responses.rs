//! Response DTOs for the query cache API
//!
//! Defines the structure of outgoing HTTP response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{CacheEntry, CacheStats, QueryKey};
use crate::record::Record;

/// Response body for reading a query (GET /queries/*key)
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub key: QueryKey,
    pub data: Record,
    pub updated_at: DateTime<Utc>,
    /// Whether the data is past its stale time
    pub stale: bool,
}

impl QueryResponse {
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.clone(),
            data: entry.data.clone(),
            updated_at: entry.updated_at,
            stale: entry.is_stale(),
        }
    }
}

/// Response body for storing a query (PUT /queries)
#[derive(Debug, Clone, Serialize)]
pub struct StoreResponse {
    pub message: String,
    pub key: QueryKey,
    /// The cached record after merging
    pub data: Record,
}

impl StoreResponse {
    pub fn new(key: QueryKey, data: Record) -> Self {
        Self {
            message: format!("Query '{}' stored successfully", key),
            key,
            data,
        }
    }
}

/// Response body for deleting a query (DELETE /queries/*key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: QueryKey,
}

impl DeleteResponse {
    pub fn new(key: QueryKey) -> Self {
        Self {
            message: format!("Query '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for a stateless merge (POST /merge)
#[derive(Debug, Clone, Serialize)]
pub struct MergeResponse {
    pub result: Record,
}

/// Response body for a manual flush (POST /snapshot)
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotResponse {
    pub message: String,
    /// Entries written
    pub entries: usize,
    /// Size of the snapshot in bytes
    pub bytes: usize,
}

impl SnapshotResponse {
    pub fn new(entries: usize, bytes: usize) -> Self {
        Self {
            message: format!("Snapshot of {} entries saved", entries),
            entries,
            bytes,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub collected: u64,
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            stale_hits: stats.stale_hits,
            misses: stats.misses,
            evictions: stats.evictions,
            collected: stats.collected,
            total_entries: stats.total_entries,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
