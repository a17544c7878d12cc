//! Per-process query history and timing

use std::time::{Duration, Instant};

use agent_market::{Orchestrator, Response};
use serde::Serialize;

/// One answered query
#[derive(Debug, Clone)]
struct Entry {
    query: String,
    elapsed: Duration,
    failed: bool,
}

/// A response stamped with its timing and position in the session
#[derive(Debug, Serialize)]
pub struct TimedResponse {
    #[serde(flatten)]
    pub response: Response,
    /// Seconds spent in the pipeline
    pub processing_time: f64,
    /// 1-based ordinal of the query within the session
    pub session_id: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub total_queries: usize,
    pub failed_queries: usize,
    pub avg_processing_time: f64,
    pub system_uptime: f64,
}

/// Times every query and keeps the history for `stats`
#[derive(Debug)]
pub struct Session {
    started: Instant,
    history: Vec<Entry>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            history: Vec::new(),
        }
    }

    /// Run `query` and record how long it took
    pub async fn ask(&mut self, orchestrator: &Orchestrator, query: &str) -> TimedResponse {
        let start = Instant::now();
        let response = orchestrator.run(query).await;
        let elapsed = start.elapsed();

        tracing::info!(elapsed_ms = elapsed.as_millis(), "query answered");
        let session_id = self.record(query, elapsed, response.is_failure());
        TimedResponse {
            response,
            processing_time: elapsed.as_secs_f64(),
            session_id,
        }
    }

    /// Append one entry and return its ordinal
    fn record(&mut self, query: &str, elapsed: Duration, failed: bool) -> usize {
        self.history.push(Entry {
            query: query.to_string(),
            elapsed,
            failed,
        });
        self.history.len()
    }

    pub fn stats(&self) -> SessionStats {
        let total = self.history.len();
        let avg_processing_time = if total == 0 {
            0.0
        } else {
            self.history
                .iter()
                .map(|e| e.elapsed.as_secs_f64())
                .sum::<f64>()
                / total as f64
        };

        SessionStats {
            total_queries: total,
            failed_queries: self.history.iter().filter(|e| e.failed).count(),
            avg_processing_time,
            system_uptime: self.started.elapsed().as_secs_f64(),
        }
    }

    /// Queries asked so far, oldest first
    pub fn queries(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(|e| e.query.as_str())
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

impl SessionStats {
    pub fn render(&self) -> String {
        format!(
            "세션 통계:\n  - 총 질의 수: {}\n  - 실패한 질의: {}\n  - 평균 처리 시간: {:.2}초\n  - 시스템 가동 시간: {:.1}초",
            self.total_queries, self.failed_queries, self.avg_processing_time, self.system_uptime
        )
    }
}
