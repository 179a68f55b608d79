//! Single-flight TTL cache.
//!
//! The one shared mutable structure in the engine. Keys are `(source,
//! mapping)` for quotes and currency pairs for FX rates; both use the same
//! mechanism. Guarantees:
//!
//! - a live entry is served without invoking the fetch,
//! - concurrent misses for the same key cost exactly one upstream call
//!   (joiners await the in-flight fetch instead of starting their own),
//! - failures are never cached; expired entries are retained so a failed
//!   re-fetch can fall back to the stale value when the policy allows it.
//!
//! The lock is held only to inspect or update the maps, never across an
//! await. Entries are handed out as clones - callers never hold references
//! into the cache, so a refresh cannot race a caller's use of a prior
//! result.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, warn};

use crate::errors::PriceError;

/// Fetch errors are shared between the in-flight leader and its joiners.
pub type CacheError = Arc<PriceError>;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, CacheError>>>;

/// How a cached value made it to the caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Freshness {
    /// Fetched upstream during this call (leader or single-flight joiner).
    Fresh,
    /// Served from a live cache entry; no fetch happened.
    Cached,
    /// Served from an expired entry because the fresh fetch failed.
    Stale,
}

/// A cache lookup result.
#[derive(Clone, Debug)]
pub struct Hit<V> {
    pub value: V,
    pub freshness: Freshness,
}

struct Entry<V> {
    value: V,
    stored_at: Instant,
    expires_at: Instant,
}

struct CacheState<K, V> {
    entries: HashMap<K, Entry<V>>,
    in_flight: HashMap<K, SharedFetch<V>>,
}

/// Time-bounded store with single-flight de-duplication.
///
/// TTL is supplied per call so one cache can hold entries with different
/// lifetimes (per-source TTL policy). TTL alone does not bound memory, so
/// an entry cap evicts expired entries first, then the oldest.
pub struct TtlCache<K, V> {
    state: Arc<Mutex<CacheState<K, V>>>,
    allow_stale_fallback: bool,
    max_entries: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Debug + Eq + Hash + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache bounded to `max_entries`, optionally serving stale
    /// entries when a re-fetch fails.
    pub fn new(max_entries: usize, allow_stale_fallback: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            })),
            allow_stale_fallback,
            max_entries: max_entries.max(1),
        }
    }

    /// Lock the cache state, recovering from poison if necessary.
    ///
    /// The worst case of recovering is one superfluous upstream call,
    /// which beats panicking the whole batch.
    fn lock(state: &Mutex<CacheState<K, V>>) -> MutexGuard<'_, CacheState<K, V>> {
        state.lock().unwrap_or_else(|poisoned| {
            warn!("cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState<K, V>> {
        Self::lock(&self.state)
    }

    /// Return the value for `key`, fetching it at most once.
    ///
    /// 1. A live entry is returned immediately, without invoking `fetch`.
    /// 2. If a fetch for this key is already in flight, join it; all
    ///    joiners receive the same eventual result.
    /// 3. Otherwise run `fetch` as the in-flight operation. Success is
    ///    stored with `ttl`; failure is never stored, but an expired entry
    ///    may be served instead when stale fallback is enabled. The
    ///    in-flight registration is released either way, so the next miss
    ///    can retry.
    ///
    /// The in-flight fetch finalizes the cache itself and runs as a
    /// detached task, so a caller that is cancelled (batch deadline, host
    /// request abort) mid-fetch cannot leave the key permanently
    /// registered. A panic inside `fetch` is caught and reported as a
    /// fetch failure.
    pub async fn get_or_fetch<F>(
        &self,
        key: K,
        ttl: Duration,
        fetch: F,
    ) -> Result<Hit<V>, CacheError>
    where
        F: Future<Output = Result<V, PriceError>> + Send + 'static,
    {
        let shared = {
            let mut state = self.lock_state();

            if let Some(entry) = state.entries.get(&key) {
                if entry.expires_at > Instant::now() {
                    debug!("cache hit for {:?}", key);
                    return Ok(Hit {
                        value: entry.value.clone(),
                        freshness: Freshness::Cached,
                    });
                }
            }

            match state.in_flight.get(&key) {
                Some(existing) => {
                    debug!("joining in-flight fetch for {:?}", key);
                    existing.clone()
                }
                None => {
                    let state_handle = Arc::clone(&self.state);
                    let fetch_key = key.clone();
                    let max_entries = self.max_entries;
                    let shared: SharedFetch<V> = async move {
                        let fetched = match AssertUnwindSafe(fetch).catch_unwind().await {
                            Ok(result) => result.map_err(Arc::new),
                            Err(_) => Err(Arc::new(PriceError::FetchFailed {
                                provider: "in-flight fetch",
                                message: "panicked".to_string(),
                            })),
                        };
                        let mut state = Self::lock(&state_handle);
                        state.in_flight.remove(&fetch_key);
                        if let Ok(value) = &fetched {
                            Self::store(
                                &mut state,
                                fetch_key,
                                value.clone(),
                                ttl,
                                max_entries,
                            );
                        }
                        fetched
                    }
                    .boxed()
                    .shared();
                    state.in_flight.insert(key.clone(), shared.clone());
                    // Drive the fetch to completion even if every caller
                    // awaiting it is dropped.
                    tokio::spawn(shared.clone());
                    shared
                }
            }
        };

        let fetched = shared.await;

        match fetched {
            Ok(value) => Ok(Hit {
                value,
                freshness: Freshness::Fresh,
            }),
            Err(error) => {
                if self.allow_stale_fallback {
                    let state = self.lock_state();
                    if let Some(entry) = state.entries.get(&key) {
                        warn!(
                            "fetch for {:?} failed ({}), serving stale cache entry",
                            key, error
                        );
                        let freshness = if entry.expires_at > Instant::now() {
                            // A concurrent fetch refreshed the entry in the
                            // meantime; it is live, not stale.
                            Freshness::Cached
                        } else {
                            Freshness::Stale
                        };
                        return Ok(Hit {
                            value: entry.value.clone(),
                            freshness,
                        });
                    }
                }
                Err(error)
            }
        }
    }

    /// Get a live entry without fetching.
    pub fn get(&self, key: &K) -> Option<V> {
        let state = self.lock_state();
        state.entries.get(key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries.
    pub fn clear(&self) {
        let mut state = self.lock_state();
        state.entries.clear();
    }

    fn store(state: &mut CacheState<K, V>, key: K, value: V, ttl: Duration, max_entries: usize) {
        let now = Instant::now();
        if !state.entries.contains_key(&key) && state.entries.len() >= max_entries {
            state.entries.retain(|_, entry| entry.expires_at > now);
            if state.entries.len() >= max_entries {
                let oldest = state
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.stored_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    debug!("cache full, evicting {:?}", oldest);
                    state.entries.remove(&oldest);
                }
            }
        }
        state.entries.insert(
            key,
            Entry {
                value,
                stored_at: now,
                expires_at: now + ttl,
            },
        );
    }

    /// Force an entry to be expired, keeping its value for stale fallback.
    #[cfg(test)]
    pub(crate) fn force_expire(&self, key: &K) {
        let mut state = self.lock_state();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.expires_at = Instant::now() - Duration::from_secs(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);

    fn fetch_counted(
        calls: &Arc<AtomicUsize>,
        value: u64,
    ) -> impl Future<Output = Result<u64, PriceError>> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(value)
        }
    }

    fn fetch_failing(
        calls: &Arc<AtomicUsize>,
    ) -> impl Future<Output = Result<u64, PriceError>> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PriceError::FetchFailed {
                provider: "TEST",
                message: "boom".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_single_flight_dedupes_concurrent_fetches() {
        let cache: Arc<TtlCache<&'static str, u64>> = Arc::new(TtlCache::new(16, false));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let fetch = fetch_counted(&calls, 42);
            handles.push(tokio::spawn(async move {
                cache.get_or_fetch("btcidr", TTL, fetch).await.unwrap()
            }));
        }

        for handle in handles {
            let hit = handle.await.unwrap();
            assert_eq!(hit.value, 42);
        }
        // All eight callers were satisfied by one upstream call.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_live_entry_served_without_fetch() {
        let cache: TtlCache<&'static str, u64> = TtlCache::new(16, false);
        let calls = Arc::new(AtomicUsize::new(0));

        let hit = cache
            .get_or_fetch("bbca", TTL, fetch_counted(&calls, 9700))
            .await
            .unwrap();
        assert_eq!(hit.freshness, Freshness::Fresh);

        let hit = cache
            .get_or_fetch("bbca", TTL, fetch_counted(&calls, 9999))
            .await
            .unwrap();
        assert_eq!(hit.value, 9700);
        assert_eq!(hit.freshness, Freshness::Cached);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiry_triggers_exactly_one_refetch() {
        let cache: TtlCache<&'static str, u64> = TtlCache::new(16, false);
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_fetch("xau", TTL, fetch_counted(&calls, 1))
            .await
            .unwrap();
        cache.force_expire(&"xau");

        let hit = cache
            .get_or_fetch("xau", TTL, fetch_counted(&calls, 2))
            .await
            .unwrap();
        assert_eq!(hit.value, 2);
        assert_eq!(hit.freshness, Freshness::Fresh);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_never_cached() {
        let cache: TtlCache<&'static str, u64> = TtlCache::new(16, false);
        let calls = Arc::new(AtomicUsize::new(0));

        assert!(cache
            .get_or_fetch("ori024", TTL, fetch_failing(&calls))
            .await
            .is_err());
        // In-flight registration was released, the next miss retries.
        assert!(cache
            .get_or_fetch("ori024", TTL, fetch_failing(&calls))
            .await
            .is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_stale_fallback_when_enabled() {
        let cache: TtlCache<&'static str, u64> = TtlCache::new(16, true);
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_fetch("xau", TTL, fetch_counted(&calls, 31_500_000))
            .await
            .unwrap();
        cache.force_expire(&"xau");

        let hit = cache
            .get_or_fetch("xau", TTL, fetch_failing(&calls))
            .await
            .unwrap();
        assert_eq!(hit.value, 31_500_000);
        assert_eq!(hit.freshness, Freshness::Stale);
    }

    #[tokio::test]
    async fn test_no_stale_fallback_when_disabled() {
        let cache: TtlCache<&'static str, u64> = TtlCache::new(16, false);
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_fetch("xau", TTL, fetch_counted(&calls, 1))
            .await
            .unwrap();
        cache.force_expire(&"xau");

        let error = cache
            .get_or_fetch("xau", TTL, fetch_failing(&calls))
            .await
            .unwrap_err();
        assert!(matches!(*error, PriceError::FetchFailed { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_caller_does_not_wedge_key() {
        let cache: Arc<TtlCache<&'static str, u64>> = Arc::new(TtlCache::new(16, false));
        let calls = Arc::new(AtomicUsize::new(0));

        // The caller abandons a slow, failing fetch before it completes.
        let slow_failure = {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(40)).await;
                Err(PriceError::FetchFailed {
                    provider: "TEST",
                    message: "provider down".to_string(),
                })
            }
        };
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            cache.get_or_fetch("btcidr", TTL, slow_failure),
        )
        .await;
        assert!(abandoned.is_err());

        // Let the detached fetch run out and release the registration.
        tokio::time::sleep(Duration::from_millis(80)).await;

        // Once the provider recovers, the key must be fetched again.
        let hit = cache
            .get_or_fetch("btcidr", TTL, fetch_counted(&calls, 42))
            .await
            .unwrap();
        assert_eq!(hit.value, 42);
        assert_eq!(hit.freshness, Freshness::Fresh);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_fetch_releases_key() {
        let cache: TtlCache<&'static str, u64> = TtlCache::new(16, false);
        let calls = Arc::new(AtomicUsize::new(0));

        let error = cache
            .get_or_fetch("xau", TTL, async { panic!("adapter bug") })
            .await
            .unwrap_err();
        assert!(matches!(*error, PriceError::FetchFailed { .. }));

        // The registration is gone; the next miss runs a fresh fetch.
        let hit = cache
            .get_or_fetch("xau", TTL, fetch_counted(&calls, 7))
            .await
            .unwrap();
        assert_eq!(hit.value, 7);
        assert_eq!(hit.freshness, Freshness::Fresh);
    }

    #[tokio::test]
    async fn test_entry_cap_evicts() {
        let cache: TtlCache<u32, u64> = TtlCache::new(2, false);
        let calls = Arc::new(AtomicUsize::new(0));

        for key in 0..4 {
            cache
                .get_or_fetch(key, TTL, fetch_counted(&calls, u64::from(key)))
                .await
                .unwrap();
        }
        assert!(cache.len() <= 2);
    }
}
