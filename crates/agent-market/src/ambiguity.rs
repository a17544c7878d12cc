//! Decides whether an understood query is specific enough to run

use agent_core::{Agent, Error as AgentError, Result as AgentResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{QueryContext, StageOutput};
use crate::intent::{Intent, TaskType, TrendScreen};

/// Vague interrogatives and superlatives
const VAGUE_KEYWORDS: &[&str] = &[
    "어떤", "무슨", "뭐가", "무엇", "좋은", "좋아", "추천", "최고", "최악", "괜찮은",
];

const CLARIFY_MESSAGE: &str = "어떤 종류의 주식을 찾으시나요?";
const CLEAR_MESSAGE: &str = "질문 의도가 명확합니다.";

/// One pick in a clarification menu
///
/// `value` is itself a valid query, so choosing an option means asking it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationOption {
    pub label: String,
    pub value: String,
}

impl ClarificationOption {
    pub(crate) fn new(label: &str, value: &str) -> Self {
        Self {
            label: label.to_string(),
            value: value.to_string(),
        }
    }
}

/// Outcome of the ambiguity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguityVerdict {
    pub clarification_needed: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ClarificationOption>,
}

impl AmbiguityVerdict {
    fn clear() -> Self {
        Self {
            clarification_needed: false,
            message: CLEAR_MESSAGE.to_string(),
            options: Vec::new(),
        }
    }

    fn clarify() -> Self {
        Self {
            clarification_needed: true,
            message: CLARIFY_MESSAGE.to_string(),
            options: vec![
                ClarificationOption::new("최근 많이 오른 주식", TrendScreen::RECENT_RISE),
                ClarificationOption::new("고점 대비 많이 떨어진 주식", TrendScreen::PEAK_DROP),
            ],
        }
    }
}

/// Pure text/intent inspection; never touches market data
#[derive(Debug, Clone, Copy, Default)]
pub struct AmbiguityChecker;

impl AmbiguityChecker {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, query: &str, intent: &Intent) -> AmbiguityVerdict {
        let resolved = intent.symbol.as_ref().is_some_and(|s| s.is_resolved());

        match intent.task {
            TaskType::SimpleInquiry if resolved => AmbiguityVerdict::clear(),
            TaskType::Screening => AmbiguityVerdict::clear(),
            TaskType::SimpleInquiry => {
                if VAGUE_KEYWORDS.iter().any(|kw| query.contains(kw)) {
                    tracing::info!(query, "query needs clarification");
                    AmbiguityVerdict::clarify()
                } else {
                    AmbiguityVerdict::clear()
                }
            }
        }
    }
}

#[async_trait]
impl Agent<QueryContext> for AmbiguityChecker {
    type Output = StageOutput;

    async fn process(&self, context: &mut QueryContext) -> AgentResult<StageOutput> {
        let intent = context.intent.as_ref().ok_or_else(|| {
            AgentError::ProcessingFailed("no intent to check".to_string())
        })?;
        Ok(StageOutput::Ambiguity(self.check(&context.query, intent)))
    }

    fn name(&self) -> &str {
        "ambiguity_checker"
    }
}
