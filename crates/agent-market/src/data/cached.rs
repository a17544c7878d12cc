//! Caching, rate-limited, retrying decorator over any `DataAccess`

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{DataAccess, MovingAverageSnapshot};
use crate::cache::{CacheKey, MarketCache};
use crate::config::MarketConfig;
use crate::error::{FetchError, FetchResult};

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Wraps a provider with a TTL cache, a rate limiter, a per-call timeout and
/// bounded retries. Only successful values are cached.
pub struct CachedDataAccess<D> {
    inner: D,
    cache: MarketCache,
    rate_limiter: SharedRateLimiter,
    config: Arc<MarketConfig>,
}

impl<D: DataAccess> CachedDataAccess<D> {
    /// Wrap `inner` with a fresh cache sized from `config`
    pub fn new(inner: D, config: Arc<MarketConfig>) -> Self {
        let cache = MarketCache::new(config.cache_ttl);
        Self::with_cache(inner, cache, config)
    }

    /// Wrap `inner` sharing an existing cache
    pub fn with_cache(inner: D, cache: MarketCache, config: Arc<MarketConfig>) -> Self {
        let quota = Quota::per_minute(
            NonZeroU32::new(config.rate_limit_per_minute).unwrap_or(NonZeroU32::MIN),
        );

        Self {
            inner,
            cache,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            config,
        }
    }

    /// The shared cache
    pub fn cache(&self) -> &MarketCache {
        &self.cache
    }

    async fn call<T, F, Fut>(&self, key: CacheKey, code: &str, op: F) -> FetchResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        self.cache
            .get_or_fetch(key, || self.with_retry(code, op))
            .await
    }

    async fn with_retry<T, F, Fut>(&self, code: &str, op: F) -> FetchResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        let mut attempt = 0;
        loop {
            tokio::time::timeout(self.config.request_timeout, self.rate_limiter.until_ready())
                .await
                .map_err(|_| FetchError::RateLimited(code.to_string()))?;

            let error = match tokio::time::timeout(self.config.request_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => FetchError::Timeout(code.to_string()),
            };

            attempt += 1;
            if !error.is_transient() || attempt >= self.config.max_retries {
                return Err(error);
            }

            let backoff = self.config.retry_backoff(attempt - 1);
            tracing::debug!(code, attempt, ?backoff, error = %error, "retrying fetch");
            tokio::time::sleep(backoff).await;
        }
    }
}

#[async_trait]
impl<D: DataAccess> DataAccess for CachedDataAccess<D> {
    async fn fetch_price(&self, code: &str, date: NaiveDate) -> FetchResult<f64> {
        let key = CacheKey::new("price", [code.to_string(), date.to_string()]);
        self.call(key, code, || self.inner.fetch_price(code, date))
            .await
    }

    async fn fetch_volume(&self, code: &str, date: NaiveDate) -> FetchResult<u64> {
        let key = CacheKey::new("volume", [code.to_string(), date.to_string()]);
        self.call(key, code, || self.inner.fetch_volume(code, date))
            .await
    }

    async fn fetch_rsi(&self, code: &str, date: NaiveDate, period: usize) -> FetchResult<f64> {
        let key = CacheKey::new(
            "rsi",
            [code.to_string(), date.to_string(), period.to_string()],
        );
        self.call(key, code, || self.inner.fetch_rsi(code, date, period))
            .await
    }

    async fn fetch_moving_average(
        &self,
        code: &str,
        date: NaiveDate,
        period: usize,
    ) -> FetchResult<MovingAverageSnapshot> {
        let key = CacheKey::new(
            "moving_average",
            [code.to_string(), date.to_string(), period.to_string()],
        );
        self.call(key, code, || {
            self.inner.fetch_moving_average(code, date, period)
        })
        .await
    }

    async fn fetch_closing_prices(
        &self,
        code: &str,
        end: NaiveDate,
        days: usize,
    ) -> FetchResult<Vec<f64>> {
        let key = CacheKey::new("closes", [code.to_string(), end.to_string(), days.to_string()]);
        self.call(key, code, || self.inner.fetch_closing_prices(code, end, days))
            .await
    }
}
