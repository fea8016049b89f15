//! Cache Module
//!
//! The live query cache: entries with staleness and gc windows, LRU capacity
//! eviction, merge-on-write of fetched data and prefetching.

mod entry;
mod key;
mod lru;
mod prefetch;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use key::QueryKey;
pub use lru::LruTracker;
pub use prefetch::{prefetch, PrefetchOutcome};
pub use stats::CacheStats;
pub use store::QueryCache;

// == Public Constants ==
/// Maximum number of segments in a query key
pub const MAX_KEY_SEGMENTS: usize = 16;
