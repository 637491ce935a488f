// =============================================================================
// Response cache — time-boxed memoisation of upstream reads
// =============================================================================
//
// One `ResponseCache` instance per TTL class (snapshot / history / analysis);
// the TTLs are injected through `Config` so tests can construct isolated
// instances with whatever lifetimes they need.
//
// An entry is live iff `now - stored_at <= ttl`. Expired entries are treated
// as absent and overwritten in place on the next store; there is no background
// sweep, so the map only grows with the number of distinct keys. Acceptable at
// watchlist scale.
//
// Two callers racing on the same cold key will both run the compute — there is
// no single-flight de-duplication. The only concurrent users are request
// handlers racing the worker on the history cache, where a duplicate fetch is
// harmless.
// =============================================================================

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Generic TTL cache keyed by a request fingerprint.
pub struct ResponseCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> ResponseCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key` if a live entry exists.
    pub fn lookup(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock();
        let entry = entries.get(key)?;
        if entry.stored_at.elapsed() <= self.ttl {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn store(&self, key: K, value: V) {
        self.entries.lock().insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Return the live value for `key`, or run `compute`, store its
    /// successful result, and return it. Failures are not cached, so the
    /// next caller retries the compute.
    pub async fn get_or_compute<E, F, Fut>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }
        let value = compute().await?;
        self.store(key, value.clone());
        Ok(value)
    }

    /// Number of entries currently held, live or expired.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_value_is_returned_while_live() {
        let cache: ResponseCache<&str, u32> = ResponseCache::new(Duration::from_secs(60));
        cache.store("key", 7);
        assert_eq!(cache.lookup(&"key"), Some(7));
    }

    #[test]
    fn expired_entry_reads_as_absent_and_is_overwritten() {
        let cache: ResponseCache<&str, u32> = ResponseCache::new(Duration::from_millis(10));

        cache.store("key", 1);
        std::thread::sleep(Duration::from_millis(25));

        assert_eq!(cache.lookup(&"key"), None);
        cache.store("key", 2);
        // The stale entry was overwritten, not kept alongside.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(&"key"), Some(2));
    }

    #[test]
    fn distinct_keys_are_distinct_entries() {
        let cache: ResponseCache<(String, String), u32> =
            ResponseCache::new(Duration::from_secs(60));

        cache.store(("AAPL".into(), "2024-01-01".into()), 1);
        cache.store(("AAPL".into(), "2024-02-01".into()), 2);

        assert_eq!(cache.lookup(&("AAPL".into(), "2024-01-01".into())), Some(1));
        assert_eq!(cache.lookup(&("AAPL".into(), "2024-02-01".into())), Some(2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn lookup_on_missing_key_is_none() {
        let cache: ResponseCache<&str, u32> = ResponseCache::new(Duration::from_secs(60));
        assert_eq!(cache.lookup(&"missing"), None);
    }

    #[tokio::test]
    async fn get_or_compute_skips_compute_on_a_live_hit() {
        let cache: ResponseCache<&str, u32> = ResponseCache::new(Duration::from_secs(60));
        cache.store("key", 7);

        let value = cache
            .get_or_compute("key", || async { Ok::<_, &str>(99) })
            .await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn get_or_compute_does_not_cache_failures() {
        let cache: ResponseCache<&str, u32> = ResponseCache::new(Duration::from_secs(60));

        let first = cache.get_or_compute("key", || async { Err("down") }).await;
        assert_eq!(first, Err("down"));
        assert_eq!(cache.lookup(&"key"), None);

        let second = cache
            .get_or_compute("key", || async { Ok::<_, &str>(2) })
            .await;
        assert_eq!(second, Ok(2));
        assert_eq!(cache.lookup(&"key"), Some(2));
    }
}
