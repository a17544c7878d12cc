//! In-memory data pool
//!
//! Holds pre-fetched market data so the pipeline can run without a live
//! provider (fixtures, replays, offline demos).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{DataAccess, MovingAverageSnapshot};
use crate::error::{FetchError, FetchResult};

#[derive(Debug, Clone, Copy, Default)]
struct DailyPoint {
    price: Option<f64>,
    volume: Option<u64>,
    rsi: Option<f64>,
}

/// Data keyed by provider code and exact date
#[derive(Debug, Clone, Default)]
pub struct DataPool {
    daily: HashMap<String, HashMap<NaiveDate, DailyPoint>>,
    moving_averages: HashMap<(String, NaiveDate), MovingAverageSnapshot>,
    closes: HashMap<String, Vec<f64>>,
}

impl DataPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    fn point(&mut self, code: &str, date: NaiveDate) -> &mut DailyPoint {
        self.daily
            .entry(code.to_string())
            .or_default()
            .entry(date)
            .or_default()
    }

    /// Store an opening price
    pub fn insert_price(&mut self, code: &str, date: NaiveDate, price: f64) -> &mut Self {
        self.point(code, date).price = Some(price);
        self
    }

    /// Store a daily volume
    pub fn insert_volume(&mut self, code: &str, date: NaiveDate, volume: u64) -> &mut Self {
        self.point(code, date).volume = Some(volume);
        self
    }

    /// Store an RSI reading
    pub fn insert_rsi(&mut self, code: &str, date: NaiveDate, rsi: f64) -> &mut Self {
        self.point(code, date).rsi = Some(rsi);
        self
    }

    /// Store a moving-average snapshot; one snapshot per code and day
    pub fn insert_moving_average(
        &mut self,
        code: &str,
        date: NaiveDate,
        snapshot: MovingAverageSnapshot,
    ) -> &mut Self {
        self.moving_averages
            .insert((code.to_string(), date), snapshot);
        self
    }

    /// Store a close history, oldest first
    pub fn insert_closes(&mut self, code: &str, closes: Vec<f64>) -> &mut Self {
        self.closes.insert(code.to_string(), closes);
        self
    }

    fn lookup<T>(
        &self,
        code: &str,
        date: NaiveDate,
        field: &str,
        pick: impl Fn(&DailyPoint) -> Option<T>,
    ) -> FetchResult<T> {
        self.daily
            .get(code)
            .and_then(|days| days.get(&date))
            .and_then(pick)
            .ok_or_else(|| FetchError::unavailable(code, format!("no {field} for {date}")))
    }
}

#[async_trait]
impl DataAccess for DataPool {
    async fn fetch_price(&self, code: &str, date: NaiveDate) -> FetchResult<f64> {
        self.lookup(code, date, "price", |p| p.price)
    }

    async fn fetch_volume(&self, code: &str, date: NaiveDate) -> FetchResult<u64> {
        self.lookup(code, date, "volume", |p| p.volume)
    }

    async fn fetch_rsi(&self, code: &str, date: NaiveDate, _period: usize) -> FetchResult<f64> {
        self.lookup(code, date, "rsi", |p| p.rsi)
    }

    async fn fetch_moving_average(
        &self,
        code: &str,
        date: NaiveDate,
        _period: usize,
    ) -> FetchResult<MovingAverageSnapshot> {
        self.moving_averages
            .get(&(code.to_string(), date))
            .copied()
            .ok_or_else(|| FetchError::unavailable(code, format!("no moving average for {date}")))
    }

    async fn fetch_closing_prices(
        &self,
        code: &str,
        _end: NaiveDate,
        _days: usize,
    ) -> FetchResult<Vec<f64>> {
        self.closes
            .get(code)
            .cloned()
            .ok_or_else(|| FetchError::unavailable(code, "no close history"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[tokio::test]
    async fn test_pool_lookups() {
        let mut pool = DataPool::new();
        pool.insert_price("005930.KS", day(15), 71_000.0)
            .insert_volume("005930.KS", day(15), 12_345)
            .insert_rsi("005930.KS", day(15), 65.3);

        assert_eq!(pool.fetch_price("005930.KS", day(15)).await, Ok(71_000.0));
        assert_eq!(pool.fetch_volume("005930.KS", day(15)).await, Ok(12_345));
        assert_eq!(pool.fetch_rsi("005930.KS", day(15), 14).await, Ok(65.3));
    }

    #[tokio::test]
    async fn test_pool_missing_values_are_unavailable() {
        let mut pool = DataPool::new();
        pool.insert_volume("005930.KS", day(15), 1);

        assert!(matches!(
            pool.fetch_price("005930.KS", day(15)).await,
            Err(FetchError::Unavailable { .. })
        ));
        assert!(pool.fetch_volume("005930.KS", day(16)).await.is_err());
        assert!(pool.fetch_volume("000660.KS", day(15)).await.is_err());
    }

    #[tokio::test]
    async fn test_pool_moving_average_and_closes() {
        let mut pool = DataPool::new();
        pool.insert_moving_average("005930.KS", day(15), MovingAverageSnapshot::new(120.0, 100.0))
            .insert_closes("005930.KS", vec![1.0, 2.0, 3.0]);

        let snapshot = pool.fetch_moving_average("005930.KS", day(15), 50).await.unwrap();
        assert!(snapshot.is_breakout);
        assert_eq!(
            pool.fetch_closing_prices("005930.KS", day(15), 60).await,
            Ok(vec![1.0, 2.0, 3.0])
        );
    }
}
