//! Read-through cache for the aggregator and the read side.
//!
//! Every key is stored under [`CACHE_PREFIX`] so `flush_namespace` only touches our own
//! entries. Concurrent misses on one key compute once; a per-key async lock is held for
//! the duration of the computation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::time::Instant;

pub const CACHE_PREFIX: &str = "news_aggregator:";
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
    async fn put(&self, key: &str, value: Value, ttl: Duration);
    /// Returns whether an entry was removed.
    async fn forget(&self, key: &str) -> bool;
    /// Remove every entry whose key starts with `prefix`. Returns how many.
    async fn flush_prefix(&self, prefix: &str) -> usize;
}

/// Process-local backend with absolute expiry.
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    entries: Mutex<HashMap<String, (Value, Instant)>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        let g = self.entries.lock();
        g.values().filter(|(_, exp)| *exp > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Option<Value> {
        let mut g = self.entries.lock();
        match g.get(key) {
            Some((v, exp)) if *exp > Instant::now() => Some(v.clone()),
            Some(_) => {
                g.remove(key);
                None
            }
            None => None,
        }
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) {
        let mut g = self.entries.lock();
        g.insert(key.to_string(), (value, Instant::now() + ttl));
    }

    async fn forget(&self, key: &str) -> bool {
        let mut g = self.entries.lock();
        g.remove(key).is_some()
    }

    async fn flush_prefix(&self, prefix: &str) -> usize {
        let mut g = self.entries.lock();
        let before = g.len();
        g.retain(|k, _| !k.starts_with(prefix));
        before - g.len()
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("cache_hits_total", "Cache lookups served from the backend.");
        describe_counter!("cache_misses_total", "Cache lookups that had to compute.");
        describe_counter!("cache_flushes_total", "Namespace flushes.");
    });
}

pub struct ArticleCache {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
    default_ttl: Duration,
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ArticleCache {
    pub fn new(backend: Arc<dyn CacheBackend>, default_ttl: Duration) -> Self {
        ensure_metrics_described();
        Self {
            backend,
            prefix: CACHE_PREFIX.to_string(),
            default_ttl,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// In-memory backend with the given default TTL.
    pub fn in_memory(default_ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryCacheBackend::new()), default_ttl)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full = self.full_key(key);
        let raw = self.backend.get(&full).await?;
        match serde_json::from_value(raw) {
            Ok(v) => Some(v),
            Err(e) => {
                // Shape changed under us; treat as a miss.
                tracing::debug!(key = %full, error = %e, "dropping undecodable cache entry");
                self.backend.forget(&full).await;
                None
            }
        }
    }

    /// `ttl` of `None` or zero means the default TTL.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let ttl = ttl.filter(|t| !t.is_zero()).unwrap_or(self.default_ttl);
        match serde_json::to_value(value) {
            Ok(v) => self.backend.put(&self.full_key(key), v, ttl).await,
            Err(e) => tracing::warn!(key, error = %e, "value not cacheable"),
        }
    }

    pub async fn forget(&self, key: &str) -> bool {
        self.backend.forget(&self.full_key(key)).await
    }

    /// Drop every entry under our prefix.
    pub async fn flush_namespace(&self) -> usize {
        counter!("cache_flushes_total").increment(1);
        self.backend.flush_prefix(&self.prefix).await
    }

    /// Return the cached value for `key`, or run `compute`, store its `Ok` value and
    /// return it. Errors are passed through and never cached.
    pub async fn remember_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            counter!("cache_hits_total").increment(1);
            return Ok(hit);
        }

        let full = self.full_key(key);
        let lock = self.key_lock(&full);
        let result = {
            let _guard = lock.lock().await;
            // Another caller may have filled it while we waited.
            if let Some(hit) = self.get::<T>(key).await {
                counter!("cache_hits_total").increment(1);
                Ok(hit)
            } else {
                counter!("cache_misses_total").increment(1);
                let computed = compute().await;
                if let Ok(v) = &computed {
                    self.put(key, v, ttl).await;
                }
                computed
            }
        };
        self.release_key_lock(&full, lock);
        result
    }

    fn key_lock(&self, full: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut g = self.inflight.lock();
        Arc::clone(g.entry(full.to_string()).or_default())
    }

    fn release_key_lock(&self, full: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut g = self.inflight.lock();
        // map + ours: nobody else is waiting
        if Arc::strong_count(&lock) <= 2 {
            g.remove(full);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn keys_are_prefixed() {
        let cache = ArticleCache::in_memory(DEFAULT_TTL);
        assert_eq!(cache.full_key("popular_10"), "news_aggregator:popular_10");
    }

    #[tokio::test]
    async fn remember_computes_once() {
        let cache = ArticleCache::in_memory(DEFAULT_TTL);
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v: Result<u32, ()> = cache
                .remember_or_compute("k", None, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await;
            assert_eq!(v, Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = ArticleCache::in_memory(DEFAULT_TTL);
        let first: Result<u32, &str> = cache.remember_or_compute("k", None, || async { Err("boom") }).await;
        assert_eq!(first, Err("boom"));
        let second: Result<u32, &str> = cache.remember_or_compute("k", None, || async { Ok(1) }).await;
        assert_eq!(second, Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let cache = ArticleCache::in_memory(DEFAULT_TTL);
        cache.put("k", &1u8, Some(Duration::from_secs(5))).await;
        assert_eq!(cache.get::<u8>("k").await, Some(1));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get::<u8>("k").await, None);
    }

    #[tokio::test]
    async fn flush_only_touches_our_prefix() {
        let backend = Arc::new(MemoryCacheBackend::new());
        backend.put("other:k", Value::from(1), DEFAULT_TTL).await;
        let cache = ArticleCache::new(backend.clone(), DEFAULT_TTL);
        cache.put("a", &1, None).await;
        cache.put("b", &2, None).await;
        assert_eq!(cache.flush_namespace().await, 2);
        assert_eq!(backend.len(), 1);
    }
}
