use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::cache_keys::{CacheKey, KeyPattern};
use crate::utils::errors::AppError;

/// How a read treats an existing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Serve fresh entries, serve-and-revalidate stale ones
    Cached,
    /// Ignore whatever is cached and go to the sources
    Force,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    fetched_at: Instant,
    stale_after: Instant,
}

/// A value read from the cache
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub value: T,
    pub is_stale: bool,
    pub age: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
    /// Callers that attached to a fetch already in flight
    pub joined: u64,
    /// Fetches actually started
    pub fetches: u64,
    pub invalidated: u64,
}

type InFlight = Shared<BoxFuture<'static, Option<Value>>>;

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    joined: AtomicU64,
    fetches: AtomicU64,
    invalidated: AtomicU64,
}

struct Inner {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    in_flight: Mutex<HashMap<CacheKey, (u64, InFlight)>>,
    // Bumped by every invalidation; fetches that started under an older
    // epoch hand their result to waiting callers but do not store it
    epoch: AtomicU64,
    next_flight_id: AtomicU64,
    counters: Counters,
}

impl Inner {
    async fn store(&self, key: &CacheKey, value: Value, ttl: Duration, started_epoch: u64) {
        let mut entries = self.entries.lock().await;
        if self.epoch.load(Ordering::SeqCst) != started_epoch {
            debug!("Discarding result for {}: invalidated while in flight", key);
            return;
        }
        let now = Instant::now();
        entries.put(
            key.clone(),
            CacheEntry {
                value,
                fetched_at: now,
                stale_after: now + ttl,
            },
        );
    }

    async fn finish_flight(&self, key: &CacheKey, flight_id: u64) {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.get(key).map(|(id, _)| *id) == Some(flight_id) {
            in_flight.remove(key);
        }
    }
}

/// Process-wide result cache shared by every consumer list.
///
/// Entries are JSON values with a freshness window. Identical concurrent
/// misses share one fetch, which runs as its own task so that a caller
/// giving up does not cancel it for everyone else.
#[derive(Clone)]
pub struct ResultCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache").finish_non_exhaustive()
    }
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(LruCache::new(capacity)),
                in_flight: Mutex::new(HashMap::new()),
                epoch: AtomicU64::new(0),
                next_flight_id: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<Cached<T>> {
        let counters = &self.inner.counters;
        let mut entries = self.inner.entries.lock().await;

        let Some(entry) = entries.get(key) else {
            counters.misses.fetch_add(1, Ordering::Relaxed);
            trace!("Cache miss: {}", key);
            return None;
        };

        let now = Instant::now();
        let is_stale = now >= entry.stale_after;
        let age = now.saturating_duration_since(entry.fetched_at);

        match serde_json::from_value::<T>(entry.value.clone()) {
            Ok(value) => {
                if is_stale {
                    counters.stale_hits.fetch_add(1, Ordering::Relaxed);
                    trace!("Stale cache hit: {} (age {:?})", key, age);
                } else {
                    counters.hits.fetch_add(1, Ordering::Relaxed);
                    trace!("Cache hit: {}", key);
                }
                Some(Cached {
                    value,
                    is_stale,
                    age,
                })
            }
            Err(e) => {
                warn!("Dropping undecodable cache entry {}: {}", key, e);
                entries.pop(key);
                counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: CacheKey, value: &T, ttl: Duration) -> Result<(), AppError> {
        let value = serde_json::to_value(value)?;
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        self.inner.store(&key, value, ttl, epoch).await;
        Ok(())
    }

    /// Remove every entry matching `pattern` and forget matching in-flight
    /// fetches. Returns the number of entries removed.
    pub async fn invalidate(&self, pattern: &KeyPattern) -> usize {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);

        let removed = {
            let mut entries = self.inner.entries.lock().await;
            let doomed: Vec<CacheKey> = entries
                .iter()
                .filter(|(key, _)| pattern.matches(key))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &doomed {
                entries.pop(key);
            }
            doomed.len()
        };

        self.inner
            .in_flight
            .lock()
            .await
            .retain(|key, _| !pattern.matches(key));

        self.inner
            .counters
            .invalidated
            .fetch_add(removed as u64, Ordering::Relaxed);
        debug!("Invalidated {} cache entries matching {}", removed, pattern);
        removed
    }

    /// Read through the cache.
    ///
    /// Fresh entries are returned as is. Stale entries are returned
    /// immediately and one background refetch is started. Misses, and every
    /// read in `FetchMode::Force`, await the shared in-flight fetch for `key`.
    pub async fn get_or_fetch<T, F>(
        &self,
        key: CacheKey,
        ttl: Duration,
        mode: FetchMode,
        fetch: F,
    ) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> BoxFuture<'static, T> + Send + 'static,
    {
        self.get_or_fetch_with_ttl(key, mode, move || {
            fetch().map(move |value| (value, ttl)).boxed()
        })
        .await
    }

    /// Like `get_or_fetch`, with the fetch deciding how long its own result
    /// stays fresh. A zero TTL stores the value already stale, so the next
    /// read serves it and refetches in the background.
    pub async fn get_or_fetch_with_ttl<T, F>(
        &self,
        key: CacheKey,
        mode: FetchMode,
        fetch: F,
    ) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> BoxFuture<'static, (T, Duration)> + Send + 'static,
    {
        if mode == FetchMode::Cached
            && let Some(cached) = self.get::<T>(&key).await
        {
            if cached.is_stale {
                self.revalidate(key, fetch).await;
            }
            return Ok(cached.value);
        }

        let flight = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(&key) {
                Some((_, existing)) => {
                    self.inner.counters.joined.fetch_add(1, Ordering::Relaxed);
                    debug!("Joining in-flight fetch for {}", key);
                    existing.clone()
                }
                None => {
                    let (id, flight) = self.start_fetch(key.clone(), fetch);
                    in_flight.insert(key.clone(), (id, flight.clone()));
                    flight
                }
            }
        };

        let value = flight.await.ok_or_else(|| {
            AppError::Serialization(format!("fetch for {} produced no value", key))
        })?;
        Ok(serde_json::from_value(value)?)
    }

    /// Start a background refresh unless one is already running
    async fn revalidate<T, F>(&self, key: CacheKey, fetch: F)
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> BoxFuture<'static, (T, Duration)> + Send + 'static,
    {
        let mut in_flight = self.inner.in_flight.lock().await;
        if in_flight.contains_key(&key) {
            trace!("Revalidation already running for {}", key);
            return;
        }
        debug!("Revalidating stale entry {}", key);
        let (id, flight) = self.start_fetch(key.clone(), fetch);
        in_flight.insert(key, (id, flight));
    }

    // Callers must register the returned flight while still holding the
    // in-flight lock; the task only deregisters after taking that lock.
    fn start_fetch<T, F>(&self, key: CacheKey, fetch: F) -> (u64, InFlight)
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> BoxFuture<'static, (T, Duration)> + Send + 'static,
    {
        let inner = self.inner.clone();
        let started_epoch = inner.epoch.load(Ordering::SeqCst);
        let flight_id = inner.next_flight_id.fetch_add(1, Ordering::Relaxed);
        inner.counters.fetches.fetch_add(1, Ordering::Relaxed);

        let handle = tokio::spawn(async move {
            let (result, ttl) = fetch().await;
            let encoded = match serde_json::to_value(&result) {
                Ok(value) => {
                    inner.store(&key, value.clone(), ttl, started_epoch).await;
                    Some(value)
                }
                Err(e) => {
                    warn!("Could not encode result for {}: {}", key, e);
                    None
                }
            };
            inner.finish_flight(&key, flight_id).await;
            encoded
        });

        let flight = handle
            .map(|joined| joined.ok().flatten())
            .boxed()
            .shared();
        (flight_id, flight)
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.inner.entries.lock().await.contains(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            stale_hits: c.stale_hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            joined: c.joined.load(Ordering::Relaxed),
            fetches: c.fetches.load(Ordering::Relaxed),
            invalidated: c.invalidated.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UserId, VideoId};
    use crate::services::cache_keys::ResourceKind;
    use crate::test_utils::common::wait_for_async;
    use std::sync::atomic::AtomicUsize;

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        value: &'static str,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, String> + Send + 'static {
        let calls = calls.clone();
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                value.to_string()
            }
            .boxed()
        }
    }

    fn key(id: &str) -> CacheKey {
        CacheKey::ViewCount(VideoId::new(id))
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let cache = ResultCache::new(16);
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        let (a, b) = tokio::join!(
            cache.get_or_fetch(
                key("v1"),
                ttl,
                FetchMode::Cached,
                counting_fetch(&calls, "one", Duration::from_millis(50))
            ),
            cache.get_or_fetch(
                key("v1"),
                ttl,
                FetchMode::Cached,
                counting_fetch(&calls, "two", Duration::from_millis(50))
            ),
        );

        assert_eq!(a.unwrap(), "one");
        assert_eq!(b.unwrap(), "one");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().joined, 1);
    }

    #[tokio::test]
    async fn test_fresh_entry_needs_no_fetch() {
        let cache = ResultCache::new(16);
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .set(key("v1"), &"cached".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let value: String = cache
            .get_or_fetch(
                key("v1"),
                Duration::from_secs(60),
                FetchMode::Cached,
                counting_fetch(&calls, "fetched", Duration::ZERO),
            )
            .await
            .unwrap();

        assert_eq!(value, "cached");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_entry_served_with_single_revalidation() {
        let cache = ResultCache::new(16);
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_millis(20);
        cache.set(key("v1"), &"old".to_string(), ttl).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        for _ in 0..2 {
            let value: String = cache
                .get_or_fetch(
                    key("v1"),
                    Duration::from_secs(60),
                    FetchMode::Cached,
                    counting_fetch(&calls, "new", Duration::from_millis(30)),
                )
                .await
                .unwrap();
            assert_eq!(value, "old");
        }

        let refreshed = wait_for_async(
            || async {
                matches!(
                    cache.get::<String>(&key("v1")).await,
                    Some(Cached { ref value, is_stale: false, .. }) if value == "new"
                )
            },
            Duration::from_secs(2),
        )
        .await;
        assert!(refreshed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_mode_bypasses_fresh_entry() {
        let cache = ResultCache::new(16);
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .set(key("v1"), &"cached".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let value: String = cache
            .get_or_fetch(
                key("v1"),
                Duration::from_secs(60),
                FetchMode::Force,
                counting_fetch(&calls, "fetched", Duration::ZERO),
            )
            .await
            .unwrap();

        assert_eq!(value, "fetched");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_result_is_served_then_refreshed() {
        let cache = ResultCache::new(16);
        let first: String = cache
            .get_or_fetch_with_ttl(key("v1"), FetchMode::Cached, || {
                async { ("sample".to_string(), Duration::ZERO) }.boxed()
            })
            .await
            .unwrap();
        assert_eq!(first, "sample");

        let second: String = cache
            .get_or_fetch_with_ttl(key("v1"), FetchMode::Cached, || {
                async { ("real".to_string(), Duration::from_secs(60)) }.boxed()
            })
            .await
            .unwrap();
        assert_eq!(second, "sample");

        let refreshed = wait_for_async(
            || async {
                cache.get::<String>(&key("v1")).await.map(|c| c.value) == Some("real".to_string())
            },
            Duration::from_secs(2),
        )
        .await;
        assert!(refreshed);
    }

    #[tokio::test]
    async fn test_invalidate_by_pattern() {
        let cache = ResultCache::new(16);
        let ttl = Duration::from_secs(60);
        cache.set(key("v1"), &1, ttl).await.unwrap();
        cache.set(key("v2"), &2, ttl).await.unwrap();
        cache
            .set(CacheKey::Subscriptions(UserId::new("u1")), &3, ttl)
            .await
            .unwrap();

        let removed = cache
            .invalidate(&KeyPattern::Resource(ResourceKind::ViewCount))
            .await;

        assert_eq!(removed, 2);
        assert!(!cache.contains(&key("v1")).await);
        assert!(
            cache
                .contains(&CacheKey::Subscriptions(UserId::new("u1")))
                .await
        );
    }

    #[tokio::test]
    async fn test_fetch_started_before_invalidation_is_not_stored() {
        let cache = ResultCache::new(16);
        let calls = Arc::new(AtomicUsize::new(0));

        let pending = {
            let cache = cache.clone();
            let fetch = counting_fetch(&calls, "pre-invalidation", Duration::from_millis(50));
            tokio::spawn(async move {
                cache
                    .get_or_fetch::<String, _>(
                        key("v1"),
                        Duration::from_secs(60),
                        FetchMode::Cached,
                        fetch,
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate(&KeyPattern::Exact(key("v1"))).await;

        assert_eq!(pending.await.unwrap().unwrap(), "pre-invalidation");
        assert!(!cache.contains(&key("v1")).await);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_fetch() {
        let cache = ResultCache::new(16);
        let calls = Arc::new(AtomicUsize::new(0));

        let caller = {
            let cache = cache.clone();
            let fetch = counting_fetch(&calls, "done", Duration::from_millis(40));
            tokio::spawn(async move {
                cache
                    .get_or_fetch::<String, _>(
                        key("v1"),
                        Duration::from_secs(60),
                        FetchMode::Cached,
                        fetch,
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();

        let stored = wait_for_async(
            || async { cache.contains(&key("v1")).await },
            Duration::from_secs(2),
        )
        .await;
        assert!(stored);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
