//! Judgment to natural-language response

use std::sync::Arc;

use agent_core::{Agent, Result as AgentResult};
use async_trait::async_trait;
use serde::Serialize;

use crate::context::{QueryContext, StageOutput};
use crate::error::Result;
use crate::handlers::analytics::AnalyticsReport;
use crate::handlers::{Judgment, with_thousands};

const INSUFFICIENT: &str = "죄송합니다. 질문의 결과를 분석하는 데 필요한 정보가 충분하지 않습니다.";
const SUGGESTIONS: [&str; 3] = [
    "삼성전자 주가 알려줘",
    "오늘 거래량이 급등한 종목은?",
    "RSI가 70 이상인 종목 보여줘",
];

/// Final response text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub response: String,
}

impl Summary {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

/// External prose generator for judgments without a fixed template
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, query: &str, judgment: &Judgment) -> Result<String>;
}

/// Renders the context's judgment; never fails
#[derive(Clone, Default)]
pub struct Summarizer {
    narrator: Option<Arc<dyn Narrator>>,
}

impl Summarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_narrator(narrator: Arc<dyn Narrator>) -> Self {
        Self {
            narrator: Some(narrator),
        }
    }

    pub async fn summarize(&self, context: &QueryContext) -> Summary {
        let Some(judgment) = context.judgment.as_ref() else {
            return Summary::new(insufficient(context.last_handler_reason()));
        };

        let response = match judgment {
            Judgment::Analysis(analysis) => analysis.explanation.clone(),
            Judgment::Screening(screening) => {
                listing(&screening.summary, screening.matches.iter().map(|m| m.name.as_str()))
            }
            Judgment::Signal(signal) => {
                listing(&signal.summary, signal.matches.iter().map(|m| m.name.as_str()))
            }
            Judgment::Trend(trend) => {
                let mut text =
                    listing(&trend.summary, trend.matches.iter().map(|m| m.name.as_str()));
                if !trend.alternatives.is_empty() {
                    text.push_str("\n\n다른 기준으로 찾아보기:");
                    for option in &trend.alternatives {
                        text.push_str(&format!("\n- {} ({})", option.label, option.value));
                    }
                }
                text
            }
            Judgment::Analytics(report) => match &self.narrator {
                Some(narrator) => match narrator.narrate(&context.query, judgment).await {
                    Ok(text) if !text.trim().is_empty() => text,
                    Ok(_) => render_analytics(report),
                    Err(e) => {
                        tracing::warn!(error = %e, "narrator failed, using template");
                        render_analytics(report)
                    }
                },
                None => render_analytics(report),
            },
        };
        Summary::new(response)
    }
}

fn insufficient(reason: Option<&str>) -> String {
    let mut text = INSUFFICIENT.to_string();
    if let Some(reason) = reason {
        text.push_str(&format!("\n사유: {reason}"));
    }
    text.push_str("\n\n이런 질문을 해보세요:");
    for suggestion in SUGGESTIONS {
        text.push_str(&format!("\n- {suggestion}"));
    }
    text
}

fn listing<'a>(summary: &str, names: impl Iterator<Item = &'a str>) -> String {
    let lines: Vec<String> = names
        .enumerate()
        .map(|(i, name)| format!("{}. {name}", i + 1))
        .collect();
    if lines.is_empty() {
        return summary.to_string();
    }
    format!("{summary}\n\n종목 목록:\n{}", lines.join("\n"))
}

fn render_analytics(report: &AnalyticsReport) -> String {
    let mut text;
    match report {
        AnalyticsReport::Correlation {
            high_correlation_pairs,
            total_pairs,
            ..
        } => {
            text = format!("상관계수 절댓값 0.7 이상인 종목 쌍 {total_pairs}개를 찾았습니다.");
            for (i, pair) in high_correlation_pairs.iter().enumerate() {
                text.push_str(&format!(
                    "\n{}. {} - {}: {}",
                    i + 1,
                    pair.symbol1,
                    pair.symbol2,
                    pair.correlation
                ));
            }
        }
        AnalyticsReport::Volatility {
            volatility_ranking, ..
        } => {
            text = "연환산 변동성 순위:".to_string();
            for (i, v) in volatility_ranking.iter().enumerate() {
                text.push_str(&format!("\n{}. {} ({}): {}%", i + 1, v.name, v.symbol, v.volatility));
            }
        }
        AnalyticsReport::Momentum {
            momentum_ranking, ..
        } => {
            text = "가중 모멘텀 순위:".to_string();
            for (i, m) in momentum_ranking.iter().enumerate() {
                text.push_str(&format!(
                    "\n{}. {} 현재가 {}원, 모멘텀 {}",
                    i + 1,
                    m.name,
                    with_thousands(m.current_price),
                    m.weighted_momentum
                ));
            }
        }
        AnalyticsReport::Portfolio {
            optimal_portfolio,
            recommendation,
            ..
        } => {
            text = recommendation.clone();
            for (i, p) in optimal_portfolio.iter().enumerate() {
                text.push_str(&format!(
                    "\n{}. {} (수익률 {}%, 변동성 {}%, 샤프 {})",
                    i + 1,
                    p.name,
                    p.annual_return,
                    p.volatility,
                    p.sharpe_ratio
                ));
            }
        }
    }
    text
}

#[async_trait]
impl Agent<QueryContext> for Summarizer {
    type Output = StageOutput;

    async fn process(&self, context: &mut QueryContext) -> AgentResult<StageOutput> {
        Ok(StageOutput::Summary(self.summarize(context).await))
    }

    fn name(&self) -> &str {
        "summarizer"
    }
}
