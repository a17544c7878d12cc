//! Market data access capability
//!
//! Handlers never talk to a provider directly; they receive an
//! `Arc<dyn DataAccess>` and only check whether a value came back.

pub mod bulk;
pub mod cached;
pub mod pool;
pub mod yahoo;

pub use bulk::{
    collect_unordered, fetch_bulk_closing_prices, fetch_bulk_moving_average, fetch_bulk_volume,
    first_matches,
};
pub use cached::CachedDataAccess;
pub use pool::DataPool;
pub use yahoo::YahooDataAccess;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FetchResult;

/// Current price against its moving average on one trading day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovingAverageSnapshot {
    pub current_price: f64,
    pub moving_average: f64,
    /// `(current_price - moving_average) / moving_average * 100`
    pub breakout_ratio: f64,
    pub is_breakout: bool,
}

impl MovingAverageSnapshot {
    /// Derive ratio and breakout flag from a price and its average
    pub fn new(current_price: f64, moving_average: f64) -> Self {
        let breakout_ratio = if moving_average > 0.0 {
            (current_price - moving_average) / moving_average * 100.0
        } else {
            0.0
        };

        Self {
            current_price,
            moving_average,
            breakout_ratio,
            is_breakout: current_price > moving_average,
        }
    }
}

/// Point-in-time market data, keyed by provider code (e.g. `005930.KS`)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataAccess: Send + Sync {
    /// Opening price on `date`
    async fn fetch_price(&self, code: &str, date: NaiveDate) -> FetchResult<f64>;

    /// Volume on the first trading day at or after `date`
    async fn fetch_volume(&self, code: &str, date: NaiveDate) -> FetchResult<u64>;

    /// RSI on the first trading day at or after `date`
    async fn fetch_rsi(&self, code: &str, date: NaiveDate, period: usize) -> FetchResult<f64>;

    /// Price against its `period`-day simple moving average
    async fn fetch_moving_average(
        &self,
        code: &str,
        date: NaiveDate,
        period: usize,
    ) -> FetchResult<MovingAverageSnapshot>;

    /// Daily closes over roughly `days` calendar days ending at `end`, oldest first
    async fn fetch_closing_prices(
        &self,
        code: &str,
        end: NaiveDate,
        days: usize,
    ) -> FetchResult<Vec<f64>>;
}
