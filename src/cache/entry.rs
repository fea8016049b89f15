//! Cache Entry Module
//!
//! Defines a cached resource together with its freshness metadata.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::QueryKey;
use crate::record::Record;

// == Cache Entry ==
/// One cached resource: its data plus staleness and retention windows.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Identifier of the cached resource
    pub key: QueryKey,
    /// The cached record
    pub data: Record,
    /// When `data` was last written
    pub updated_at: DateTime<Utc>,
    /// How long after `updated_at` the data counts as fresh
    pub stale_time: Duration,
    /// How long the entry is retained without being read
    pub gc_time: Duration,
    /// Last read or write of this entry. Not persisted.
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry written now.
    pub fn new(key: QueryKey, data: Record, stale_time: Duration, gc_time: Duration) -> Self {
        Self::new_at(key, data, stale_time, gc_time, Utc::now())
    }

    /// Creates an entry written at `now`.
    pub fn new_at(
        key: QueryKey,
        data: Record,
        stale_time: Duration,
        gc_time: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            data,
            updated_at: now,
            stale_time,
            gc_time,
            last_accessed: now,
        }
    }

    // == Staleness ==
    /// True once `stale_time` has fully elapsed since the last write.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        match deadline(self.updated_at, self.stale_time) {
            Some(stale_at) => now >= stale_at,
            None => false,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    // == Garbage Collection ==
    /// True once the entry has gone unread for at least `gc_time`.
    pub fn is_collectable_at(&self, now: DateTime<Utc>) -> bool {
        match deadline(self.last_accessed, self.gc_time) {
            Some(collect_at) => now >= collect_at,
            None => false,
        }
    }

    pub fn is_collectable(&self) -> bool {
        self.is_collectable_at(Utc::now())
    }

    // == Touch ==
    /// Records a read at `now`. The access clock never moves backwards.
    pub fn touch_at(&mut self, now: DateTime<Utc>) {
        self.last_accessed = self.last_accessed.max(now);
    }

    /// Replaces the data, keeping `updated_at` monotonic.
    pub fn replace_data_at(&mut self, data: Record, now: DateTime<Utc>) {
        self.data = data;
        self.updated_at = self.updated_at.max(now);
        self.touch_at(now);
    }
}

/// `start + window`, or `None` when the window is too large to represent.
fn deadline(start: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| start.checked_add_signed(window))
}
