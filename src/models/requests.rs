//! Request DTOs for the query cache API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::cache::{QueryKey, MAX_KEY_SEGMENTS};
use crate::record::Record;

/// Request body for storing fetched data (PUT /queries)
///
/// The data is merged with whatever is already cached under `key`; cached
/// fields keep precedence and missing ones are filled in.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreQueryRequest {
    /// Query key segments, e.g. `["ranking", "daily"]`
    pub key: Vec<String>,
    /// The fetched (possibly partial) record
    pub data: Record,
    /// Optional stale time in milliseconds
    #[serde(default)]
    pub stale_time_ms: Option<u64>,
    /// Optional gc time in milliseconds
    #[serde(default)]
    pub gc_time_ms: Option<u64>,
}

impl StoreQueryRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key must have at least one segment".to_string());
        }
        if self.key.len() > MAX_KEY_SEGMENTS {
            return Some(format!("Key exceeds {} segments", MAX_KEY_SEGMENTS));
        }
        if self.key.iter().any(|segment| segment.is_empty() || segment.contains('/')) {
            return Some("Key segments must be non-empty and contain no '/'".to_string());
        }
        None
    }

    pub fn query_key(&self) -> QueryKey {
        QueryKey::new(self.key.iter().cloned())
    }
}

/// Request body for a stateless merge (POST /merge)
#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequest {
    /// The precedence-holding record
    pub target: Record,
    /// Gap-filling records, applied left to right
    #[serde(default)]
    pub sources: Vec<Record>,
}
