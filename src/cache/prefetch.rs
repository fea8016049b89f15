//! Prefetch Module
//!
//! Warms the query cache before dependent consumers read from it.
//!
//! This is a library entry point for applications that embed the cache and
//! own a data source. The HTTP server has no fetcher of its own, so no route
//! calls it; embedders pass the server's shared `AppState::cache` instead.

use std::future::Future;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::{QueryCache, QueryKey};
use crate::record::Record;

// == Prefetch Outcome ==
/// How a prefetch settled. Prefetching never fails outright; a failed fetch
/// leaves the cache as it was and callers render an empty state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefetchOutcome {
    /// A fresh entry was already cached; nothing was fetched
    Fresh,
    /// Data was fetched and merged into the cache
    Fetched,
    /// The fetch or the cache write failed
    Failed(String),
}

impl PrefetchOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, PrefetchOutcome::Failed(_))
    }
}

// == Prefetch ==
/// Ensures `key` holds fresh data, calling `fetcher` only when needed.
///
/// The fetched record is merged with any cached record via
/// [`QueryCache::merge_fetched`]. The lock is not held while fetching.
pub async fn prefetch<F, Fut>(cache: &RwLock<QueryCache>, key: QueryKey, fetcher: F) -> PrefetchOutcome
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<Record>>,
{
    let fresh = {
        let guard = cache.read().await;
        guard
            .peek(&key)
            .map(|entry| !entry.is_stale() && !entry.is_collectable())
            .unwrap_or(false)
    };

    if fresh {
        debug!("Prefetch skipped, {} is fresh", key);
        return PrefetchOutcome::Fresh;
    }

    let fetched = match fetcher().await {
        Ok(record) => record,
        Err(err) => {
            warn!("Prefetch of {} failed: {:#}", key, err);
            return PrefetchOutcome::Failed(err.to_string());
        }
    };

    let mut guard = cache.write().await;
    match guard.merge_fetched(key.clone(), fetched, None, None) {
        Ok(_) => {
            debug!("Prefetched {}", key);
            PrefetchOutcome::Fetched
        }
        Err(err) => {
            warn!("Prefetch of {} could not be cached: {}", key, err);
            PrefetchOutcome::Failed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::record::{record_from_json, Value};
    use serde_json::json;

    fn cache(stale: Duration) -> RwLock<QueryCache> {
        RwLock::new(QueryCache::new(10, stale, Duration::from_secs(300)))
    }

    fn key() -> QueryKey {
        QueryKey::new(["ranking", "daily"])
    }

    #[tokio::test]
    async fn test_prefetch_fetches_missing_entry() {
        let cache = cache(Duration::from_secs(60));

        let outcome = prefetch(&cache, key(), || async {
            Ok::<_, anyhow::Error>(record_from_json(json!({"items": [1, 2]})).unwrap())
        })
        .await;

        assert_eq!(outcome, PrefetchOutcome::Fetched);
        let guard = cache.read().await;
        assert_eq!(
            guard.peek(&key()).unwrap().data["items"],
            Value::Array(vec![Value::from(1), Value::from(2)])
        );
    }

    #[tokio::test]
    async fn test_prefetch_skips_fresh_entry() {
        let cache = cache(Duration::from_secs(60));
        cache
            .write()
            .await
            .set(key(), Record::new(), None, None)
            .unwrap();

        let outcome = prefetch(&cache, key(), || async {
            Err::<Record, _>(anyhow::anyhow!("fetcher must not run"))
        })
        .await;

        assert_eq!(outcome, PrefetchOutcome::Fresh);
    }

    #[tokio::test]
    async fn test_prefetch_merges_into_stale_entry() {
        let cache = cache(Duration::ZERO);
        cache
            .write()
            .await
            .set(key(), record_from_json(json!({"title": "cached"})).unwrap(), None, None)
            .unwrap();

        let outcome = prefetch(&cache, key(), || async {
            Ok::<_, anyhow::Error>(record_from_json(json!({"title": "fetched", "total": 3})).unwrap())
        })
        .await;

        assert_eq!(outcome, PrefetchOutcome::Fetched);
        let guard = cache.read().await;
        let data = &guard.peek(&key()).unwrap().data;
        assert_eq!(data["title"], Value::from("cached"));
        assert_eq!(data["total"], Value::from(3));
    }

    #[test]
    fn test_prefetch_failure_is_contained() {
        let cache = cache(Duration::from_secs(60));

        let outcome = tokio_test::block_on(prefetch(&cache, key(), || async {
            Err::<Record, _>(anyhow::anyhow!("upstream returned 404"))
        }));

        assert!(outcome.is_failed());
        assert!(tokio_test::block_on(cache.read()).is_empty());
    }
}
