//! Yahoo Finance backed `DataAccess`

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate};
use ta::Next;
use ta::indicators::{RelativeStrengthIndex, SimpleMovingAverage};
use time::OffsetDateTime;
use yahoo_finance_api as yahoo;

use super::{DataAccess, MovingAverageSnapshot};
use crate::error::{FetchError, FetchResult};

/// One daily bar
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bar {
    date: NaiveDate,
    open: f64,
    close: f64,
    volume: u64,
}

/// Live market data from Yahoo Finance daily history
#[derive(Debug, Clone, Default)]
pub struct YahooDataAccess {}

impl YahooDataAccess {
    /// Create a new Yahoo Finance data source
    pub fn new() -> Self {
        Self {}
    }

    async fn history(&self, code: &str, start: NaiveDate, end: NaiveDate) -> FetchResult<Vec<Bar>> {
        let provider =
            yahoo::YahooConnector::new().map_err(|e| FetchError::Provider(e.to_string()))?;

        let response = provider
            .get_quote_history(code, to_offset(start)?, to_offset(end)?)
            .await
            .map_err(|e| FetchError::Provider(e.to_string()))?;

        let quotes = response
            .quotes()
            .map_err(|e| FetchError::unavailable(code, e.to_string()))?;

        let bars: Vec<Bar> = quotes
            .iter()
            .filter_map(|q| {
                let date = DateTime::from_timestamp(q.timestamp as i64, 0)?.date_naive();
                Some(Bar {
                    date,
                    open: q.open,
                    close: q.close,
                    volume: q.volume,
                })
            })
            .collect();

        if bars.is_empty() {
            return Err(FetchError::unavailable(code, format!("no quotes {start}..{end}")));
        }
        Ok(bars)
    }
}

fn to_offset(date: NaiveDate) -> FetchResult<OffsetDateTime> {
    let timestamp = date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .ok_or_else(|| FetchError::Provider(format!("invalid date {date}")))?;

    OffsetDateTime::from_unix_timestamp(timestamp)
        .map_err(|e| FetchError::Provider(format!("Invalid timestamp: {e}")))
}

fn shift(date: NaiveDate, back: u64, forward: u64) -> (NaiveDate, NaiveDate) {
    let start = date.checked_sub_days(Days::new(back)).unwrap_or(date);
    let end = date.checked_add_days(Days::new(forward)).unwrap_or(date);
    (start, end)
}

/// First bar on or after `date`
fn first_on_or_after(bars: &[Bar], date: NaiveDate) -> Option<(usize, &Bar)> {
    bars.iter().enumerate().find(|(_, bar)| bar.date >= date)
}

fn rsi_series(closes: &[f64], period: usize) -> FetchResult<Vec<f64>> {
    let mut rsi = RelativeStrengthIndex::new(period)
        .map_err(|e| FetchError::Provider(format!("invalid RSI period: {e}")))?;
    Ok(closes.iter().map(|&close| rsi.next(close)).collect())
}

fn sma_last(closes: &[f64], period: usize) -> FetchResult<f64> {
    let mut sma = SimpleMovingAverage::new(period)
        .map_err(|e| FetchError::Provider(format!("invalid moving-average period: {e}")))?;
    closes
        .iter()
        .map(|&close| sma.next(close))
        .last()
        .ok_or_else(|| FetchError::Provider("empty close series".to_string()))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[async_trait]
impl DataAccess for YahooDataAccess {
    async fn fetch_price(&self, code: &str, date: NaiveDate) -> FetchResult<f64> {
        let (start, end) = shift(date, 1, 1);
        let bars = self.history(code, start, end).await?;
        bars.iter()
            .find(|bar| bar.date == date)
            .map(|bar| bar.open)
            .ok_or_else(|| FetchError::unavailable(code, format!("no session on {date}")))
    }

    async fn fetch_volume(&self, code: &str, date: NaiveDate) -> FetchResult<u64> {
        let (start, end) = shift(date, 0, 7);
        let bars = self.history(code, start, end).await?;
        first_on_or_after(&bars, date)
            .map(|(_, bar)| bar.volume)
            .ok_or_else(|| FetchError::unavailable(code, format!("no session on or after {date}")))
    }

    async fn fetch_rsi(&self, code: &str, date: NaiveDate, period: usize) -> FetchResult<f64> {
        let (start, end) = shift(date, (period as u64) * 3 + 60, 7);
        let bars = self.history(code, start, end).await?;
        let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
        let series = rsi_series(&closes, period)?;

        let (index, _) = first_on_or_after(&bars, date)
            .ok_or_else(|| FetchError::unavailable(code, format!("no session on or after {date}")))?;
        if index < period {
            return Err(FetchError::unavailable(code, "not enough history for RSI"));
        }
        Ok(round2(series[index]))
    }

    async fn fetch_moving_average(
        &self,
        code: &str,
        date: NaiveDate,
        period: usize,
    ) -> FetchResult<MovingAverageSnapshot> {
        let (start, end) = shift(date, (period as u64) * 2 + 30, 1);
        let bars = self.history(code, start, end).await?;
        let closes: Vec<f64> = bars
            .iter()
            .filter(|bar| bar.date <= date)
            .map(|bar| bar.close)
            .collect();

        if closes.len() < period {
            return Err(FetchError::unavailable(
                code,
                format!("{} closes for a {period}-day average", closes.len()),
            ));
        }

        let current_price = closes[closes.len() - 1];
        let moving_average = sma_last(&closes, period)?;
        Ok(MovingAverageSnapshot::new(current_price, moving_average))
    }

    async fn fetch_closing_prices(
        &self,
        code: &str,
        end: NaiveDate,
        days: usize,
    ) -> FetchResult<Vec<f64>> {
        let (start, _) = shift(end, days as u64 + 50, 0);
        let bars = self.history(code, start, end).await?;
        Ok(bars.iter().map(|bar| bar.close).collect())
    }
}
