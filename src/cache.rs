//! Lookaside caches in front of the store. Entries are derived, always expire, and a
//! failing cache is treated by callers as a miss.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;
use crate::inference::PredictResponse;
use crate::model::{ModelParams, Version};

/// Upper bound on any entry's lifetime; longer TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// How often an insert also sweeps out expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Active-model parameters keyed by series id.
#[async_trait]
pub trait ModelCache: Send + Sync {
    /// `Ok(None)` is a miss, not an error.
    async fn get(&self, series_id: &str) -> Result<Option<ModelParams>>;

    /// Overwrites the entry, unless `params.version` is older than a version already
    /// announced through `invalidate`. Such a put is a no-op.
    async fn put(&self, series_id: &str, params: ModelParams, ttl: Duration) -> Result<()>;

    /// Drops the entry. `committed` is the version that made it stale, when known; later
    /// puts of anything older are ignored.
    async fn invalidate(&self, series_id: &str, committed: Option<Version>) -> Result<()>;

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct Inner<K, V> {
    map: HashMap<K, Entry<V>>,
    next_sweep: Instant,
}

/// In-process map with a per-entry deadline. Expired entries are evicted on read and
/// swept periodically on insert.
pub struct TtlCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                next_sweep: Instant::now() + SWEEP_INTERVAL,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut inner = self.inner();
        let now = Instant::now();
        let found = match inner.map.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                inner.map.remove(key);
                None
            }
            None => None,
        };
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// A zero `ttl` stores nothing; anything above [`MAX_TTL`] is clamped.
    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let now = Instant::now();
        let Some(expires_at) = now.checked_add(ttl.min(MAX_TTL)) else {
            return;
        };

        let mut inner = self.inner();
        if now >= inner.next_sweep {
            inner.map.retain(|_, e| e.expires_at > now);
            inner.next_sweep = now + SWEEP_INTERVAL;
        }
        inner.map.insert(key, Entry { value, expires_at });
    }

    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner().map.remove(key).is_some()
    }

    pub fn retain(&self, mut keep: impl FnMut(&K) -> bool) {
        self.inner().map.retain(|k, _| keep(k));
    }

    /// Drops expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner();
        let before = inner.map.len();
        inner.map.retain(|_, e| e.expires_at > now);
        inner.next_sweep = now + SWEEP_INTERVAL;
        before - inner.map.len()
    }

    pub fn len(&self) -> usize {
        self.inner().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

/// Newest committed version per series, as announced by invalidations.
#[derive(Default)]
struct CommittedVersions(Mutex<HashMap<String, Version>>);

impl CommittedVersions {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Version>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn record_commit(committed: &mut HashMap<String, Version>, series_id: &str, version: Version) {
    let newest = committed.entry(series_id.to_string()).or_insert(version);
    *newest = (*newest).max(version);
}

fn is_superseded(committed: &HashMap<String, Version>, series_id: &str, version: Version) -> bool {
    committed.get(series_id).is_some_and(|newest| version < *newest)
}

/// The in-process [`ModelCache`]. A put of parameters read before a retrain but
/// written after its invalidation is refused, so the old version cannot come back.
#[derive(Default)]
pub struct ModelParamsCache {
    entries: TtlCache<String, ModelParams>,
    committed: CommittedVersions,
}

impl ModelParamsCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelCache for ModelParamsCache {
    async fn get(&self, series_id: &str) -> Result<Option<ModelParams>> {
        Ok(self.entries.get(series_id))
    }

    async fn put(&self, series_id: &str, params: ModelParams, ttl: Duration) -> Result<()> {
        // Held across the insert so an invalidation cannot slip in between.
        let committed = self.committed.lock();
        if is_superseded(&committed, series_id, params.version) {
            debug!(series_id, version = %params.version, "skipping cache write of superseded version");
            return Ok(());
        }
        self.entries.insert(series_id.to_string(), params, ttl);
        Ok(())
    }

    async fn invalidate(&self, series_id: &str, committed: Option<Version>) -> Result<()> {
        let mut versions = self.committed.lock();
        if let Some(version) = committed {
            record_commit(&mut versions, series_id, version);
        }
        self.entries.remove(series_id);
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.entries.stats()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    series_id: String,
    timestamp: i64,
    value_bits: u64,
}

/// Memoized prediction results for repeated `(series, timestamp, value)` requests.
pub struct PredictionMemo {
    cache: TtlCache<MemoKey, PredictResponse>,
    committed: CommittedVersions,
    ttl: Duration,
}

impl PredictionMemo {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(),
            committed: CommittedVersions::default(),
            ttl,
        }
    }

    fn key(series_id: &str, timestamp: i64, value: f64) -> MemoKey {
        MemoKey {
            series_id: series_id.to_string(),
            timestamp,
            value_bits: value.to_bits(),
        }
    }

    pub fn get(&self, series_id: &str, timestamp: i64, value: f64) -> Option<PredictResponse> {
        self.cache.get(&Self::key(series_id, timestamp, value))
    }

    /// Ignored when the response was scored by a superseded version.
    pub fn insert(&self, series_id: &str, timestamp: i64, value: f64, response: PredictResponse) {
        let committed = self.committed.lock();
        if is_superseded(&committed, series_id, response.model_version) {
            return;
        }
        self.cache
            .insert(Self::key(series_id, timestamp, value), response, self.ttl);
    }

    /// Forgets every memoized result for one series.
    pub fn invalidate_series(&self, series_id: &str, committed: Option<Version>) {
        let mut versions = self.committed.lock();
        if let Some(version) = committed {
            record_commit(&mut versions, series_id, version);
        }
        self.cache.retain(|k| k.series_id != series_id);
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mean: f64, version: u32) -> ModelParams {
        ModelParams {
            mean,
            std: 1.0,
            threshold: 3.0,
            version: Version::new(version).unwrap(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache: TtlCache<String, ModelParams> = TtlCache::new();
        cache.insert("s1".into(), params(1.0, 1), Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("s1"), Some(params(1.0, 1)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("s1"), None);
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn put_overwrites_and_invalidate_evicts() {
        let cache = ModelParamsCache::new();
        let ttl = Duration::from_secs(3600);
        cache.put("s1", params(1.0, 1), ttl).await.unwrap();
        cache.put("s1", params(2.0, 2), ttl).await.unwrap();
        assert_eq!(cache.get("s1").await.unwrap(), Some(params(2.0, 2)));

        cache.invalidate("s1", None).await.unwrap();
        assert_eq!(cache.get("s1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_after_invalidation_refuses_older_version() {
        let cache = ModelParamsCache::new();
        let ttl = Duration::from_secs(3600);
        cache.invalidate("s1", Version::new(2)).await.unwrap();

        cache.put("s1", params(1.0, 1), ttl).await.unwrap();
        assert_eq!(cache.get("s1").await.unwrap(), None);

        cache.put("s1", params(2.0, 2), ttl).await.unwrap();
        assert_eq!(cache.get("s1").await.unwrap(), Some(params(2.0, 2)));

        // an older announcement never lowers the bar
        cache.invalidate("s1", Version::new(1)).await.unwrap();
        cache.put("s1", params(1.0, 1), ttl).await.unwrap();
        assert_eq!(cache.get("s1").await.unwrap(), None);

        cache.put("other", params(1.0, 1), ttl).await.unwrap();
        assert!(cache.get("other").await.unwrap().is_some());
    }

    #[test]
    fn zero_ttl_stores_nothing() {
        let cache: TtlCache<String, u32> = TtlCache::new();
        cache.insert("k".into(), 1, Duration::ZERO);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn huge_ttl_is_clamped() {
        let cache: TtlCache<&'static str, u32> = TtlCache::new();
        cache.insert("k", 1, Duration::MAX);
        assert_eq!(cache.get("k"), Some(1));

        tokio::time::advance(MAX_TTL + Duration::from_secs(1)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired() {
        let cache: TtlCache<&'static str, u32> = TtlCache::new();
        cache.insert("short", 1, Duration::from_secs(1));
        cache.insert("long", 2, Duration::from_secs(100));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.get("long"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn insert_sweeps_expired_entries() {
        let cache: TtlCache<u32, u32> = TtlCache::new();
        for k in 0..1000 {
            cache.insert(k, k, Duration::from_secs(300));
        }
        assert_eq!(cache.len(), 1000);

        tokio::time::advance(Duration::from_secs(24 * 60 * 60)).await;
        cache.insert(5000, 1, Duration::from_secs(300));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&5000u32), Some(1));
    }

    #[tokio::test]
    async fn memo_invalidates_one_series() {
        let memo = PredictionMemo::new(Duration::from_secs(300));
        let response = PredictResponse {
            anomaly: true,
            model_version: Version::FIRST,
        };
        memo.insert("a", 10, 1.5, response.clone());
        memo.insert("b", 10, 1.5, response.clone());
        assert_eq!(memo.get("a", 10, 1.5), Some(response.clone()));
        assert_eq!(memo.get("a", 10, 1.6), None);

        memo.invalidate_series("a", None);
        assert_eq!(memo.get("a", 10, 1.5), None);
        assert_eq!(memo.get("b", 10, 1.5), Some(response));
    }

    #[tokio::test]
    async fn memo_refuses_results_of_superseded_version() {
        let memo = PredictionMemo::new(Duration::from_secs(300));
        memo.invalidate_series("a", Version::new(2));

        let stale = PredictResponse {
            anomaly: false,
            model_version: Version::FIRST,
        };
        memo.insert("a", 10, 1.5, stale);
        assert_eq!(memo.get("a", 10, 1.5), None);

        let fresh = PredictResponse {
            anomaly: true,
            model_version: Version::new(2).unwrap(),
        };
        memo.insert("a", 10, 1.5, fresh.clone());
        assert_eq!(memo.get("a", 10, 1.5), Some(fresh));
    }
}
