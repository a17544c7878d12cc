//! Bounded-concurrency fetching
//!
//! Every candidate becomes its own spawned task; at most `concurrency` of
//! them are in flight. Dropping the stream detaches tasks that already
//! started, so they run to completion in the background and their results
//! are discarded.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};

use super::{DataAccess, MovingAverageSnapshot};
use crate::error::FetchResult;

/// Run `task` over `items` and keep the first `limit` hits, in item order
///
/// Once `limit` hits are collected no further task is started.
pub async fn first_matches<I, T, F, Fut>(
    items: Vec<I>,
    concurrency: usize,
    limit: usize,
    mut task: F,
) -> Vec<T>
where
    F: FnMut(I) -> Fut,
    Fut: Future<Output = Option<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut matches = Vec::new();
    if limit == 0 {
        return matches;
    }

    let mut results = stream::iter(items)
        .map(|item| tokio::spawn(task(item)))
        .buffered(concurrency.max(1));

    while let Some(joined) = results.next().await {
        match joined {
            Ok(Some(hit)) => {
                matches.push(hit);
                if matches.len() >= limit {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "fetch task aborted"),
        }
    }

    matches
}

/// Run `task` over `items` and collect every hit in completion order
pub async fn collect_unordered<I, T, F, Fut>(items: Vec<I>, concurrency: usize, mut task: F) -> Vec<T>
where
    F: FnMut(I) -> Fut,
    Fut: Future<Output = Option<T>> + Send + 'static,
    T: Send + 'static,
{
    let joined: Vec<_> = stream::iter(items)
        .map(|item| tokio::spawn(task(item)))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    joined
        .into_iter()
        .filter_map(|result| match result {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(error = %e, "fetch task aborted");
                None
            }
        })
        .collect()
}

async fn bulk<T, F, Fut>(codes: &[String], concurrency: usize, fetch: F) -> HashMap<String, T>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = FetchResult<T>> + Send + 'static,
    T: Send + 'static,
{
    collect_unordered(codes.to_vec(), concurrency, |code| {
        let pending = fetch(code.clone());
        async move {
            match pending.await {
                Ok(value) => Some((code, value)),
                Err(e) => {
                    tracing::debug!(code = %code, error = %e, "bulk fetch miss");
                    None
                }
            }
        }
    })
    .await
    .into_iter()
    .collect()
}

/// Volume per code; unavailable codes are dropped
pub async fn fetch_bulk_volume(
    data: &Arc<dyn DataAccess>,
    codes: &[String],
    date: NaiveDate,
    concurrency: usize,
) -> HashMap<String, u64> {
    bulk(codes, concurrency, |code| {
        let data = Arc::clone(data);
        async move { data.fetch_volume(&code, date).await }
    })
    .await
}

/// Close history per code, oldest first; unavailable codes are dropped
pub async fn fetch_bulk_closing_prices(
    data: &Arc<dyn DataAccess>,
    codes: &[String],
    end: NaiveDate,
    days: usize,
    concurrency: usize,
) -> HashMap<String, Vec<f64>> {
    bulk(codes, concurrency, |code| {
        let data = Arc::clone(data);
        async move { data.fetch_closing_prices(&code, end, days).await }
    })
    .await
}

/// Moving-average snapshot per code; unavailable codes are dropped
pub async fn fetch_bulk_moving_average(
    data: &Arc<dyn DataAccess>,
    codes: &[String],
    date: NaiveDate,
    period: usize,
    concurrency: usize,
) -> HashMap<String, MovingAverageSnapshot> {
    bulk(codes, concurrency, |code| {
        let data = Arc::clone(data);
        async move { data.fetch_moving_average(&code, date, period).await }
    })
    .await
}
