//! Caching layer for data-provider calls

use cached::{Cached, TimedCache};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Cache key: a data kind plus the key parts that identify one value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Data kind, e.g. `volume` or `rsi`
    pub kind: String,
    /// Ordered key parts, e.g. code and date
    pub parts: Vec<String>,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new<I, S>(kind: impl Into<String>, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self {
            kind: kind.into(),
            parts: parts.into_iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.parts.join(":"))
    }
}

/// Thread-safe TTL cache for provider values
pub struct MarketCache {
    cache: Arc<RwLock<TimedCache<CacheKey, serde_json::Value>>>,
}

impl MarketCache {
    /// Create a new cache with specified TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(TimedCache::with_lifespan(ttl))),
        }
    }

    /// Look up `kind` + `parts`
    pub async fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let mut cache = self.cache.write().await;
        cache.cache_get(key).cloned()
    }

    /// Store a value under `kind` + `parts`
    pub async fn set(&self, key: CacheKey, value: serde_json::Value) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_set(key, value);
    }

    /// Get or fetch a value using the provided fetcher function
    ///
    /// Values that fail to deserialize are treated as a miss. Only successful
    /// fetches are stored.
    pub async fn get_or_fetch<T, F, Fut, E>(&self, key: CacheKey, fetcher: F) -> Result<T, E>
    where
        T: Serialize + for<'de> Deserialize<'de>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(&key).await {
            if let Ok(hit) = serde_json::from_value(value) {
                tracing::debug!(key = %key, "cache hit");
                return Ok(hit);
            }
        }

        tracing::debug!(key = %key, "cache miss");

        let fetched = fetcher().await?;
        if let Ok(value) = serde_json::to_value(&fetched) {
            self.set(key, value).await;
        }

        Ok(fetched)
    }

    /// Invalidate a specific cache entry
    pub async fn invalidate(&self, key: &CacheKey) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_remove(key);
    }

    /// Clear all cached entries
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.cache_clear();
    }

    /// Get the number of cached entries
    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.cache_size()
    }

    /// Check if the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Clone for MarketCache {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_display() {
        let key = CacheKey::new("volume", ["005930.KS", "2024-01-15"]);
        assert_eq!(key.kind, "volume");
        assert_eq!(key.to_string(), "volume:005930.KS:2024-01-15");
    }

    #[tokio::test]
    async fn test_cache_set_and_get() {
        let cache = MarketCache::new(Duration::from_secs(60));
        let key = CacheKey::new("price", ["005930.KS", "2024-01-15"]);

        cache.set(key.clone(), serde_json::json!(71_000.0)).await;

        assert_eq!(cache.get(&key).await, Some(serde_json::json!(71_000.0)));
        assert!(cache.get(&CacheKey::new("price", ["000660.KS"])).await.is_none());
    }

    #[tokio::test]
    async fn test_get_or_fetch_calls_fetcher_once() {
        let cache = MarketCache::new(Duration::from_secs(60));
        let key = CacheKey::new("volume", ["005930.KS", "2024-01-15"]);

        let mut call_count = 0;
        let first: Result<u64, String> = cache
            .get_or_fetch(key.clone(), || {
                call_count += 1;
                async { Ok(1_000) }
            })
            .await;
        assert_eq!(first, Ok(1_000));

        let second: Result<u64, String> = cache
            .get_or_fetch(key, || {
                call_count += 1;
                async { Ok(2_000) }
            })
            .await;
        assert_eq!(second, Ok(1_000));
        assert_eq!(call_count, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let cache = MarketCache::new(Duration::from_secs(60));
        let key = CacheKey::new("rsi", ["005930.KS"]);

        let failed: Result<f64, String> = cache
            .get_or_fetch(key.clone(), || async { Err("down".to_string()) })
            .await;
        assert!(failed.is_err());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_cache_invalidate_and_clear() {
        let cache = MarketCache::new(Duration::from_secs(60));
        for i in 0..5 {
            let key = CacheKey::new("volume", [format!("CODE{i}")]);
            cache.set(key, serde_json::json!(i)).await;
        }
        assert_eq!(cache.len().await, 5);

        cache.invalidate(&CacheKey::new("volume", ["CODE0"])).await;
        assert_eq!(cache.len().await, 4);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
