//! Task handlers: one judgment family each
//!
//! At most one handler applies to a given intent; the others report
//! `skipped`. A handler never fails the pipeline for missing data. It
//! returns `no_judgment` with a reason instead.

pub mod analytics;
pub mod analyzer;
pub mod screener;
pub mod signal;
pub mod trend;

pub use analytics::{AdvancedAnalytics, AnalyticsReport};
pub use analyzer::{AnalysisJudgment, AnalysisMetric, Analyzer};
pub use screener::{ScreenedStock, Screener, ScreeningJudgment};
pub use signal::{BreakoutStock, SignalDetector, SignalJudgment};
pub use trend::{TrendJudgment, TrendScreener, TrendStock};

use std::sync::Arc;

use agent_core::{Agent, Result as AgentResult};
use async_trait::async_trait;
use serde::Serialize;

use crate::config::MarketConfig;
use crate::context::{QueryContext, StageOutput};
use crate::data::DataAccess;
use crate::intent::{Intent, Today};
use crate::symbols::SymbolTable;

/// Confidence attached to a successful judgment
pub const JUDGMENT_CONFIDENCE: f64 = 0.95;

/// Domain answer produced by a handler
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "judgment_type", rename_all = "snake_case")]
pub enum Judgment {
    Analysis(AnalysisJudgment),
    Screening(ScreeningJudgment),
    Signal(SignalJudgment),
    Analytics(AnalyticsReport),
    Trend(TrendJudgment),
}

/// What a handler stage produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HandlerOutcome {
    Judgment { judgment: Judgment, confidence: f64 },
    NoJudgment { confidence: f64, reason: String },
    Error { error: String },
    Skipped { reason: String },
}

impl HandlerOutcome {
    pub fn judged(judgment: Judgment) -> Self {
        Self::Judgment {
            judgment,
            confidence: JUDGMENT_CONFIDENCE,
        }
    }

    pub fn no_judgment(reason: impl Into<String>) -> Self {
        Self::NoJudgment {
            confidence: 0.0,
            reason: reason.into(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn judgment(&self) -> Option<&Judgment> {
        match self {
            Self::Judgment { judgment, .. } => Some(judgment),
            _ => None,
        }
    }

    /// Human-readable reason for a missing judgment
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::NoJudgment { reason, .. } => Some(reason),
            Self::Error { error } => Some(error),
            _ => None,
        }
    }
}

/// Dependencies shared by every handler
#[derive(Clone)]
pub struct Services {
    pub config: Arc<MarketConfig>,
    pub data: Arc<dyn DataAccess>,
    pub symbols: Arc<SymbolTable>,
    pub today: Today,
}

impl Services {
    pub fn new(
        config: Arc<MarketConfig>,
        data: Arc<dyn DataAccess>,
        symbols: Arc<SymbolTable>,
        today: Today,
    ) -> Self {
        Self {
            config,
            data,
            symbols,
            today,
        }
    }
}

/// A judgment family over the understood intent
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Stage name
    fn name(&self) -> &'static str;

    /// Whether this handler owns the intent
    fn applies(&self, intent: &Intent) -> bool;

    async fn handle(&self, intent: &Intent) -> HandlerOutcome;
}

/// Pipeline stage running one [`TaskHandler`]
pub struct HandlerStage<H>(pub H);

#[async_trait]
impl<H: TaskHandler> Agent<QueryContext> for HandlerStage<H> {
    type Output = StageOutput;

    async fn process(&self, context: &mut QueryContext) -> AgentResult<StageOutput> {
        let outcome = match context.intent.as_ref() {
            None => HandlerOutcome::skipped("no intent"),
            Some(intent) if !self.0.applies(intent) => HandlerOutcome::skipped("not applicable"),
            Some(intent) => {
                let outcome = self.0.handle(intent).await;
                tracing::info!(handler = self.0.name(), status = outcome_status(&outcome), "handler finished");
                outcome
            }
        };
        Ok(StageOutput::Handler(outcome))
    }

    fn name(&self) -> &str {
        self.0.name()
    }
}

fn outcome_status(outcome: &HandlerOutcome) -> &'static str {
    match outcome {
        HandlerOutcome::Judgment { .. } => "judgment",
        HandlerOutcome::NoJudgment { .. } => "no_judgment",
        HandlerOutcome::Error { .. } => "error",
        HandlerOutcome::Skipped { .. } => "skipped",
    }
}

/// Round to `places` decimals
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10_f64.powi(places);
    (value * scale).round() / scale
}

/// `1234567.5` → `"1,234,567.5"`
pub(crate) fn with_thousands(value: f64) -> String {
    let rounded = round_to(value, 2);
    let sign = if rounded < 0.0 { "-" } else { "" };
    let whole = rounded.abs().trunc() as u64;
    let cents = ((rounded.abs() - rounded.abs().trunc()) * 100.0).round() as u64;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match cents {
        0 => format!("{sign}{grouped}"),
        c if c % 10 == 0 => format!("{sign}{grouped}.{}", c / 10),
        c => format!("{sign}{grouped}.{c:02}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_thousands() {
        assert_eq!(with_thousands(71_000.0), "71,000");
        assert_eq!(with_thousands(1_234_567.5), "1,234,567.5");
        assert_eq!(with_thousands(999.0), "999");
        assert_eq!(with_thousands(1_000.05), "1,000.05");
        assert_eq!(with_thousands(-2_500.0), "-2,500");
    }

    #[test]
    fn test_round_to() {
        assert!((round_to(12.3456, 2) - 12.35).abs() < 1e-9);
        assert!((round_to(0.73049, 3) - 0.73).abs() < 1e-9);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = HandlerOutcome::no_judgment("RSI 데이터를 찾을 수 없습니다.");
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"status": "no_judgment", "confidence": 0.0, "reason": "RSI 데이터를 찾을 수 없습니다."})
        );
        assert_eq!(outcome.reason(), Some("RSI 데이터를 찾을 수 없습니다."));
        assert!(outcome.judgment().is_none());

        let skipped = HandlerOutcome::skipped("not applicable");
        assert!(skipped.reason().is_none());
    }
}
