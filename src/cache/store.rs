//! Query Cache Module
//!
//! The live query cache: keyed entries with staleness, gc-based retention,
//! capacity-bounded LRU eviction and merge-on-write of fetched records.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, LruTracker, QueryKey, MAX_KEY_SEGMENTS};
use crate::error::{CacheError, Result};
use crate::merge::merge;
use crate::record::Record;

// == Query Cache ==
/// In-memory query cache.
#[derive(Debug)]
pub struct QueryCache {
    entries: HashMap<QueryKey, CacheEntry>,
    lru: LruTracker<QueryKey>,
    stats: CacheStats,
    max_entries: usize,
    default_stale_time: Duration,
    default_gc_time: Duration,
    /// Bumped on every write; compared by the persistence task
    mutations: u64,
}

impl QueryCache {
    // == Constructor ==
    /// Creates an empty cache.
    ///
    /// # Arguments
    /// * `max_entries` - Capacity before least recently used entries are evicted
    /// * `default_stale_time` - Freshness window for writes that give none
    /// * `default_gc_time` - Retention window for writes that give none
    pub fn new(max_entries: usize, default_stale_time: Duration, default_gc_time: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_entries,
            default_stale_time,
            default_gc_time,
            mutations: 0,
        }
    }

    // == Get ==
    /// Reads an entry and marks it used.
    ///
    /// Stale entries are still returned. An entry past its gc time is removed
    /// and reported as expired.
    pub fn get(&mut self, key: &QueryKey) -> Result<&CacheEntry> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&mut self, key: &QueryKey, now: DateTime<Utc>) -> Result<&CacheEntry> {
        let collectable = match self.entries.get(key) {
            Some(entry) => entry.is_collectable_at(now),
            None => {
                self.stats.record_miss();
                return Err(CacheError::NotFound(key.to_string()));
            }
        };

        if collectable {
            self.remove_entry(key);
            self.mutations += 1;
            self.stats.record_collected(1);
            self.stats.record_miss();
            return Err(CacheError::Expired(key.to_string()));
        }

        self.lru.touch(key);
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| CacheError::Internal(format!("entry vanished: {}", key)))?;
        entry.touch_at(now);
        self.stats.record_hit(entry.is_stale_at(now));
        Ok(&*entry)
    }

    // == Peek ==
    /// Reads an entry without touching access order or statistics.
    pub fn peek(&self, key: &QueryKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Staleness ==
    /// Whether the entry for `key` is stale, or `None` if there is no entry.
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.entries.get(key).map(CacheEntry::is_stale)
    }

    // == Set ==
    /// Writes `data` under `key`, replacing any previous data.
    ///
    /// Windows left as `None` fall back to the cache defaults. `updated_at`
    /// never decreases for a key. At capacity, the least recently used entry
    /// is evicted first.
    pub fn set(
        &mut self,
        key: QueryKey,
        data: Record,
        stale_time: Option<Duration>,
        gc_time: Option<Duration>,
    ) -> Result<()> {
        self.set_at(key, data, stale_time, gc_time, Utc::now())
    }

    pub fn set_at(
        &mut self,
        key: QueryKey,
        data: Record,
        stale_time: Option<Duration>,
        gc_time: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        validate_key(&key)?;

        let stale_time = stale_time.unwrap_or(self.default_stale_time);
        let gc_time = gc_time.unwrap_or(self.default_gc_time);

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.replace_data_at(data, now);
            entry.stale_time = stale_time;
            entry.gc_time = gc_time;
        } else {
            self.make_room()?;
            let entry = CacheEntry::new_at(key.clone(), data, stale_time, gc_time, now);
            self.entries.insert(key.clone(), entry);
        }

        self.lru.touch(&key);
        self.mutations += 1;
        self.stats.set_total_entries(self.entries.len());
        Ok(())
    }

    // == Merge Fetched ==
    /// Combines a freshly fetched partial record with the cached one.
    ///
    /// The cached record is the merge target and keeps precedence; the
    /// fetched record fills in whatever the cached one lacks. Without a live
    /// cached entry the fetched record is stored as-is.
    pub fn merge_fetched(
        &mut self,
        key: QueryKey,
        fetched: Record,
        stale_time: Option<Duration>,
        gc_time: Option<Duration>,
    ) -> Result<&CacheEntry> {
        self.merge_fetched_at(key, fetched, stale_time, gc_time, Utc::now())
    }

    pub fn merge_fetched_at(
        &mut self,
        key: QueryKey,
        fetched: Record,
        stale_time: Option<Duration>,
        gc_time: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<&CacheEntry> {
        let data = match self.entries.get(&key) {
            Some(cached) if !cached.is_collectable_at(now) => {
                merge(&cached.data, std::slice::from_ref(&fetched))
            }
            _ => fetched,
        };

        self.set_at(key.clone(), data, stale_time, gc_time, now)?;
        self.entries
            .get(&key)
            .ok_or_else(|| CacheError::Internal(format!("entry vanished: {}", key)))
    }

    // == Remove ==
    pub fn remove(&mut self, key: &QueryKey) -> Result<()> {
        if self.remove_entry(key).is_some() {
            self.mutations += 1;
            Ok(())
        } else {
            Err(CacheError::NotFound(key.to_string()))
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.mutations += 1;
        }
        self.entries.clear();
        self.lru.clear();
        self.stats.set_total_entries(0);
    }

    // == Garbage Collection ==
    /// Removes every entry that has gone unread for its gc time.
    ///
    /// Returns the number of entries removed.
    pub fn collect_garbage(&mut self) -> usize {
        self.collect_garbage_at(Utc::now())
    }

    pub fn collect_garbage_at(&mut self, now: DateTime<Utc>) -> usize {
        let collectable: Vec<QueryKey> = self
            .entries
            .values()
            .filter(|entry| entry.is_collectable_at(now))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &collectable {
            self.remove_entry(key);
        }
        if !collectable.is_empty() {
            self.mutations += 1;
        }

        self.stats.record_collected(collectable.len());
        collectable.len()
    }

    // == Snapshot ==
    /// Copies out every live entry, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<QueryKey, CacheEntry> {
        let now = Utc::now();
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_collectable_at(now))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    // == Hydrate ==
    /// Loads restored entries into the cache.
    ///
    /// Access clocks restart at `now`. A live entry at least as recent as the
    /// restored one is kept. Returns the number of entries taken.
    pub fn hydrate(&mut self, restored: BTreeMap<QueryKey, CacheEntry>) -> usize {
        self.hydrate_at(restored, Utc::now())
    }

    pub fn hydrate_at(
        &mut self,
        restored: BTreeMap<QueryKey, CacheEntry>,
        now: DateTime<Utc>,
    ) -> usize {
        let mut taken = 0;

        for (key, mut entry) in restored {
            if validate_key(&key).is_err() {
                debug!("Skipping restored entry with invalid key: {:?}", key);
                continue;
            }
            if let Some(live) = self.entries.get(&key) {
                if live.updated_at >= entry.updated_at {
                    continue;
                }
            } else if self.make_room().is_err() {
                break;
            }

            entry.key = key.clone();
            entry.last_accessed = now;
            self.entries.insert(key.clone(), entry);
            self.lru.touch(&key);
            taken += 1;
        }

        self.stats.set_total_entries(self.entries.len());
        taken
    }

    // == Accessors ==
    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    /// Number of writes since creation.
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Internals ==
    fn remove_entry(&mut self, key: &QueryKey) -> Option<CacheEntry> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.lru.remove(key);
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }

    /// Evicts until there is space for one more entry.
    fn make_room(&mut self) -> Result<()> {
        while self.entries.len() >= self.max_entries {
            match self.lru.evict_oldest() {
                Some(evicted) => {
                    debug!("Evicting least recently used query: {}", evicted);
                    self.entries.remove(&evicted);
                    self.stats.record_eviction();
                }
                None => {
                    return Err(CacheError::CacheFull(
                        "Cache is full and eviction failed".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }
}

fn validate_key(key: &QueryKey) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest(
            "Query key must have at least one segment".to_string(),
        ));
    }
    if key.segments().len() > MAX_KEY_SEGMENTS {
        return Err(CacheError::InvalidRequest(format!(
            "Query key exceeds {} segments",
            MAX_KEY_SEGMENTS
        )));
    }
    if key.segments().iter().any(|segment| segment.is_empty()) {
        return Err(CacheError::InvalidRequest(
            "Query key segments cannot be empty".to_string(),
        ));
    }
    Ok(())
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{record_from_json, Value};
    use serde_json::json;

    const STALE: Duration = Duration::from_secs(60);
    const GC: Duration = Duration::from_secs(300);

    fn cache(max_entries: usize) -> QueryCache {
        QueryCache::new(max_entries, STALE, GC)
    }

    fn key(id: &str) -> QueryKey {
        QueryKey::new(["item", id])
    }

    fn rec(json: serde_json::Value) -> Record {
        record_from_json(json).unwrap()
    }

    #[test]
    fn test_set_and_get() {
        let mut cache = cache(10);

        cache.set(key("1"), rec(json!({"title": "a"})), None, None).unwrap();
        let entry = cache.get(&key("1")).unwrap();

        assert_eq!(entry.data, rec(json!({"title": "a"})));
        assert_eq!(entry.stale_time, STALE);
        assert_eq!(entry.gc_time, GC);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let mut cache = cache(10);
        assert!(matches!(cache.get(&key("nope")), Err(CacheError::NotFound(_))));
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let mut cache = cache(10);

        let empty = cache.set(QueryKey::new(Vec::<String>::new()), Record::new(), None, None);
        assert!(matches!(empty, Err(CacheError::InvalidRequest(_))));

        let blank = cache.set(QueryKey::new(["item", ""]), Record::new(), None, None);
        assert!(matches!(blank, Err(CacheError::InvalidRequest(_))));

        let long = QueryKey::new((0..=MAX_KEY_SEGMENTS).map(|i| i.to_string()));
        assert!(matches!(
            cache.set(long, Record::new(), None, None),
            Err(CacheError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_merge_fetched_keeps_cached_values_and_fills_gaps() {
        let mut cache = cache(10);
        cache
            .set(key("1"), rec(json!({"title": "cached", "meta": {"views": 1}})), None, None)
            .unwrap();

        let entry = cache
            .merge_fetched(
                key("1"),
                rec(json!({"title": "fetched", "meta": {"views": 9, "likes": 4}, "rank": 2})),
                None,
                None,
            )
            .unwrap();

        assert_eq!(
            entry.data,
            rec(json!({"title": "cached", "meta": {"views": 1, "likes": 4}, "rank": 2}))
        );
    }

    #[test]
    fn test_merge_fetched_without_entry_stores_partial() {
        let mut cache = cache(10);
        let entry = cache
            .merge_fetched(key("1"), rec(json!({"rank": 2})), None, None)
            .unwrap();
        assert_eq!(entry.data, rec(json!({"rank": 2})));
    }

    #[test]
    fn test_merge_fetched_ignores_collectable_entry() {
        let mut cache = cache(10);
        let now = Utc::now();
        cache
            .set_at(key("1"), rec(json!({"old": true})), None, None, now)
            .unwrap();

        let later = now + chrono::Duration::seconds(301);
        let entry = cache
            .merge_fetched_at(key("1"), rec(json!({"new": true})), None, None, later)
            .unwrap();
        assert_eq!(entry.data, rec(json!({"new": true})));
    }

    #[test]
    fn test_updated_at_is_monotonic() {
        let mut cache = cache(10);
        let now = Utc::now();

        cache.set_at(key("1"), Record::new(), None, None, now).unwrap();
        cache
            .set_at(key("1"), Record::new(), None, None, now - chrono::Duration::seconds(5))
            .unwrap();

        assert_eq!(cache.peek(&key("1")).unwrap().updated_at, now);
    }

    #[test]
    fn test_stale_entries_are_still_served() {
        let mut cache = cache(10);
        let now = Utc::now();
        cache.set_at(key("1"), Record::new(), None, None, now).unwrap();

        let later = now + chrono::Duration::seconds(61);
        assert!(cache.get_at(&key("1"), later).is_ok());
        assert_eq!(cache.stats().stale_hits, 1);
        assert_eq!(cache.is_stale(&key("1")), Some(false));
        assert_eq!(cache.is_stale(&key("2")), None);
    }

    #[test]
    fn test_untouched_entry_is_evicted_after_gc_time() {
        let mut cache = cache(10);
        let now = Utc::now();
        cache.set_at(key("1"), Record::new(), None, None, now).unwrap();

        let later = now + chrono::Duration::seconds(300);
        assert!(matches!(cache.get_at(&key("1"), later), Err(CacheError::Expired(_))));
        assert!(cache.peek(&key("1")).is_none());
        assert!(matches!(cache.get_at(&key("1"), later), Err(CacheError::NotFound(_))));
    }

    #[test]
    fn test_reads_postpone_collection() {
        let mut cache = cache(10);
        let now = Utc::now();
        cache.set_at(key("1"), Record::new(), None, None, now).unwrap();

        cache.get_at(&key("1"), now + chrono::Duration::seconds(200)).unwrap();
        assert!(cache.get_at(&key("1"), now + chrono::Duration::seconds(400)).is_ok());
    }

    #[test]
    fn test_collect_garbage() {
        let mut cache = cache(10);
        let now = Utc::now();
        cache
            .set_at(key("short"), Record::new(), None, Some(Duration::from_secs(1)), now)
            .unwrap();
        cache.set_at(key("long"), Record::new(), None, None, now).unwrap();

        let removed = cache.collect_garbage_at(now + chrono::Duration::seconds(2));
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().collected, 1);
        assert!(cache.peek(&key("long")).is_some());
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let mut cache = cache(2);

        cache.set(key("1"), Record::new(), None, None).unwrap();
        cache.set(key("2"), Record::new(), None, None).unwrap();
        cache.get(&key("1")).unwrap();
        cache.set(key("3"), Record::new(), None, None).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.peek(&key("2")).is_none());
        assert!(cache.peek(&key("1")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_zero_capacity_is_full() {
        let mut cache = cache(0);
        let result = cache.set(key("1"), Record::new(), None, None);
        assert!(matches!(result, Err(CacheError::CacheFull(_))));
    }

    #[test]
    fn test_remove_and_mutation_count() {
        let mut cache = cache(10);
        cache.set(key("1"), Record::new(), None, None).unwrap();
        assert_eq!(cache.mutation_count(), 1);

        cache.remove(&key("1")).unwrap();
        assert_eq!(cache.mutation_count(), 2);
        assert!(matches!(cache.remove(&key("1")), Err(CacheError::NotFound(_))));
        assert_eq!(cache.mutation_count(), 2);
    }

    #[test]
    fn test_snapshot_and_hydrate() {
        let mut source = cache(10);
        source
            .set(key("1"), rec(json!({"n": 1})), None, None)
            .unwrap();
        source
            .set(key("2"), rec(json!({"n": 2})), None, None)
            .unwrap();
        let snapshot = source.snapshot();
        assert_eq!(snapshot.len(), 2);

        let mut restored = cache(10);
        assert_eq!(restored.hydrate(snapshot), 2);
        assert_eq!(restored.mutation_count(), 0);
        assert_eq!(
            restored.get(&key("2")).unwrap().data["n"],
            Value::from(2)
        );
    }

    #[test]
    fn test_hydrate_keeps_newer_live_entries() {
        let now = Utc::now();
        let mut live = cache(10);
        live.set_at(key("1"), rec(json!({"v": "live"})), None, None, now).unwrap();

        let mut restored = BTreeMap::new();
        restored.insert(
            key("1"),
            CacheEntry::new_at(
                key("1"),
                rec(json!({"v": "old"})),
                STALE,
                GC,
                now - chrono::Duration::seconds(30),
            ),
        );

        assert_eq!(live.hydrate_at(restored, now), 0);
        assert_eq!(live.peek(&key("1")).unwrap().data, rec(json!({"v": "live"})));
    }
}
