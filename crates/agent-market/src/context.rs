//! Per-query pipeline state

use agent_core::Error;
use agent_workflow::PipelineState;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use uuid::Uuid;

use crate::ambiguity::AmbiguityVerdict;
use crate::handlers::{HandlerOutcome, Judgment};
use crate::intent::Intent;
use crate::summarizer::Summary;

/// What a pipeline stage produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StageOutput {
    Intent(Intent),
    Ambiguity(AmbiguityVerdict),
    Handler(HandlerOutcome),
    Summary(Summary),
}

/// A recorded stage error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageLog {
    pub stage: String,
    pub error: String,
}

/// Stage outputs in pipeline order, serialized as an ordered map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageResults(Vec<(String, StageOutput)>);

impl StageResults {
    pub fn get(&self, stage: &str) -> Option<&StageOutput> {
        self.0
            .iter()
            .find_map(|(name, output)| (name == stage).then_some(output))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StageOutput)> {
        self.0.iter().map(|(name, output)| (name.as_str(), output))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, stage: &str, output: StageOutput) {
        self.0.push((stage.to_string(), output));
    }
}

impl Serialize for StageResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (stage, output) in &self.0 {
            map.serialize_entry(stage, output)?;
        }
        map.end()
    }
}

/// The unit of work threaded through the pipeline
///
/// Created per query and discarded once the response is assembled.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub id: Uuid,
    pub query: String,
    pub timestamp: DateTime<Local>,
    /// Written once by the understander
    pub intent: Option<Intent>,
    pub results: StageResults,
    /// Latest handler judgment; last writer wins
    pub judgment: Option<Judgment>,
    /// Set when the ambiguity check asks the user for more detail
    pub clarification: Option<AmbiguityVerdict>,
    pub logs: Vec<StageLog>,
}

impl QueryContext {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            timestamp: Local::now(),
            intent: None,
            results: StageResults::default(),
            judgment: None,
            clarification: None,
            logs: Vec::new(),
        }
    }

    pub fn clarification_needed(&self) -> bool {
        self.clarification.is_some()
    }

    /// Reason given by the last handler that ran but produced no judgment
    pub fn last_handler_reason(&self) -> Option<&str> {
        self.results
            .iter()
            .filter_map(|(_, output)| match output {
                StageOutput::Handler(outcome) => outcome.reason(),
                _ => None,
            })
            .last()
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.results.iter().find_map(|(_, output)| match output {
            StageOutput::Summary(summary) => Some(summary),
            _ => None,
        })
    }
}

impl PipelineState for QueryContext {
    type Output = StageOutput;

    fn record(&mut self, stage: &str, output: StageOutput) {
        match &output {
            StageOutput::Intent(intent) => self.intent = Some(intent.clone()),
            StageOutput::Ambiguity(verdict) if verdict.clarification_needed => {
                self.clarification = Some(verdict.clone());
            }
            StageOutput::Handler(HandlerOutcome::Judgment { judgment, .. }) => {
                self.judgment = Some(judgment.clone());
            }
            StageOutput::Handler(HandlerOutcome::Error { error }) => {
                tracing::warn!(stage, error = %error, "handler precondition failed");
                self.logs.push(StageLog {
                    stage: stage.to_string(),
                    error: error.clone(),
                });
            }
            _ => {}
        }
        self.results.push(stage, output);
    }

    fn record_failure(&mut self, stage: &str, error: &Error) {
        self.logs.push(StageLog {
            stage: stage.to_string(),
            error: error.to_string(),
        });
    }

    fn halted(&self) -> bool {
        self.clarification_needed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{AnalysisJudgment, AnalysisMetric};
    use crate::intent::TaskType;
    use chrono::NaiveDate;
    use serde_json::json;

    fn judgment() -> Judgment {
        Judgment::Analysis(AnalysisJudgment {
            symbol: "카카오".to_string(),
            code: "035720.KS".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 16).unwrap(),
            metric: AnalysisMetric::Price { price: 50_000.0 },
            condition_met: None,
            explanation: "카카오의 2024-01-16 시가는 50,000원입니다.".to_string(),
        })
    }

    #[test]
    fn test_record_updates_context() {
        let mut context = QueryContext::new("오늘 카카오 시가");
        context.record("query_understander", StageOutput::Intent(Intent::new(TaskType::SimpleInquiry)));
        context.record("analyzer", StageOutput::Handler(HandlerOutcome::judged(judgment())));
        context.record("screener", StageOutput::Handler(HandlerOutcome::skipped("not applicable")));

        assert!(context.intent.is_some());
        assert_eq!(context.judgment, Some(judgment()));
        assert_eq!(context.results.len(), 3);
        assert!(!context.halted());
        assert!(context.logs.is_empty());
    }

    #[test]
    fn test_handler_error_is_logged() {
        let mut context = QueryContext::new("거래량 50% 이상 종목");
        context.record("screener", StageOutput::Handler(HandlerOutcome::error("방향 없음")));
        context.record_failure("signal_detector", &Error::ProcessingFailed("boom".to_string()));

        assert_eq!(context.logs.len(), 2);
        assert_eq!(context.logs[0], StageLog {
            stage: "screener".to_string(),
            error: "방향 없음".to_string(),
        });
        assert_eq!(context.last_handler_reason(), Some("방향 없음"));
        assert!(context.judgment.is_none());
    }

    #[test]
    fn test_results_serialize_in_pipeline_order() {
        let mut context = QueryContext::new("q");
        context.record("b_stage", StageOutput::Summary(Summary::new("two")));
        context.record("a_stage", StageOutput::Handler(HandlerOutcome::skipped("x")));

        let text = serde_json::to_string(&context.results).unwrap();
        assert!(text.find("b_stage").unwrap() < text.find("a_stage").unwrap());
        assert_eq!(
            serde_json::to_value(&context.results).unwrap(),
            json!({
                "b_stage": {"response": "two"},
                "a_stage": {"status": "skipped", "reason": "x"}
            })
        );
        assert_eq!(context.summary().map(|s| s.response.as_str()), Some("two"));
    }
}
