//! Rule-based query understanding
//!
//! Every rule runs independently over the raw text; there is no model call.

use std::sync::LazyLock;

use agent_core::{Agent, Result as AgentResult};
use async_trait::async_trait;
use regex::Regex;

use super::dates::{DateSpec, Today, extract_date};
use super::{
    AnalyticsKind, BreakoutCondition, ConditionSet, Intent, TaskType, TrendScreen, VolumeDirection,
};
use crate::context::{QueryContext, StageOutput};
use crate::symbols::SymbolResolver;

/// Keyword tables (Korean)
mod keywords_ko {
    /// Any of these makes the query a screening task
    pub const SCREENING: &[&str] = &[
        "이상",
        "미만",
        "상위",
        "하위",
        "증가",
        "급등",
        "감소",
        "하락",
        "퍼센트",
        "비율",
        "전날 대비",
        "조건",
        "검색",
        "이동평균",
        "돌파",
        "상관관계",
        "변동성",
        "모멘텀",
        "포트폴리오",
        "샤프",
    ];

    pub const VOLUME: &str = "거래량";

    pub const VOLUME_UP: &[&str] = &["늘어난", "증가", "상승", "급등"];

    pub const VOLUME_DOWN: &[&str] = &["줄어든", "감소", "하락", "낮은"];

    pub const BREAKOUT: &[&str] = &["이동평균", "돌파"];

    pub const PEAK: &str = "고점";

    pub const DROP: &[&str] = &["떨어진", "하락"];

    pub const RECENT: &str = "최근";

    pub const RISE: &[&str] = &["오른", "상승"];

    /// Checked in order; the first hit picks the analysis
    pub const ANALYTICS: &[(&str, super::AnalyticsKind)] = &[
        ("상관관계", super::AnalyticsKind::Correlation),
        ("변동성", super::AnalyticsKind::Volatility),
        ("모멘텀", super::AnalyticsKind::Momentum),
        ("포트폴리오", super::AnalyticsKind::Portfolio),
        ("샤프", super::AnalyticsKind::Portfolio),
    ];
}

static RSI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)RSI.*?(\d+)").expect("rsi pattern is valid"));

static VOLUME_CHANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"거래량.*?(\d+)\s*%?").expect("volume pattern is valid"));

static LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*(개|종목)").expect("limit pattern is valid"));

static MA_PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*일\s*이동평균").expect("moving-average pattern is valid")
});

static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("percent pattern is valid"));

static WEEKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*주").expect("weeks pattern is valid"));

static DAYS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*일").expect("days pattern is valid"));

static RECENT_DAYS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"최근\s*(\d+)\s*일").expect("recent-days pattern is valid"));

/// Trading sessions in a year
const SESSIONS_PER_YEAR: usize = 252;

/// Turns free text into an [`Intent`]
#[derive(Debug, Clone)]
pub struct QueryUnderstander {
    resolver: SymbolResolver,
    today: Today,
    default_ma_period: usize,
    default_breakout_threshold: f64,
}

impl QueryUnderstander {
    pub fn new(resolver: SymbolResolver, today: Today) -> Self {
        Self {
            resolver,
            today,
            default_ma_period: 50,
            default_breakout_threshold: 10.0,
        }
    }

    /// Override the breakout defaults used when the text names none
    pub fn with_breakout_defaults(mut self, period: usize, threshold: f64) -> Self {
        self.default_ma_period = period;
        self.default_breakout_threshold = threshold;
        self
    }

    /// Understand one query
    pub fn understand(&self, text: &str) -> Intent {
        let text = text.trim();
        let condition = self.extract_conditions(text);
        let task = Self::classify(text, &condition);
        let mut intent = Intent::new(task);

        match extract_date(text, self.today.date()) {
            Some(DateSpec::Single(date)) => intent.date = Some(date),
            Some(DateSpec::Range(range)) => intent.date_range = Some(range),
            None => {}
        }

        intent.condition = condition;
        intent.limit = Self::extract_limit(text);

        if task == TaskType::SimpleInquiry {
            intent.symbol = Some(self.resolver.extract_and_resolve(text));
        }

        tracing::debug!(?intent, "query understood");
        intent
    }

    fn classify(text: &str, condition: &ConditionSet) -> TaskType {
        if condition.trend.is_some() || Self::matches_any(text, keywords_ko::SCREENING) {
            TaskType::Screening
        } else {
            TaskType::SimpleInquiry
        }
    }

    fn extract_conditions(&self, text: &str) -> ConditionSet {
        let mut condition = ConditionSet {
            rsi: capture_number(&RSI, text),
            ..Default::default()
        };

        if text.contains(keywords_ko::VOLUME) {
            if Self::matches_any(text, keywords_ko::VOLUME_DOWN) {
                condition.volume_direction = Some(VolumeDirection::Down);
            } else if Self::matches_any(text, keywords_ko::VOLUME_UP) {
                condition.volume_direction = Some(VolumeDirection::Up);
            }
        }
        condition.volume_change = capture_number(&VOLUME_CHANGE, text);

        if Self::matches_any(text, keywords_ko::BREAKOUT) {
            condition.breakout = Some(BreakoutCondition {
                period: capture_number(&MA_PERIOD, text)
                    .filter(|p| *p > 0)
                    .unwrap_or(self.default_ma_period),
                threshold: capture_number(&PERCENT, text)
                    .unwrap_or(self.default_breakout_threshold),
            });
        }

        condition.analytics = keywords_ko::ANALYTICS
            .iter()
            .find(|(kw, _)| text.contains(kw))
            .map(|(_, kind)| *kind);

        condition.trend = TrendScreen::from_value(text).or_else(|| Self::extract_trend(text));

        condition
    }

    /// Price-trend phrasing; volume wording belongs to the volume rules
    fn extract_trend(text: &str) -> Option<TrendScreen> {
        if text.contains(keywords_ko::VOLUME) {
            return None;
        }

        if text.contains(keywords_ko::PEAK) && Self::matches_any(text, keywords_ko::DROP) {
            let days = capture_number::<usize>(&WEEKS, text)
                .filter(|w| *w > 0)
                .map(|w| if w == 52 { SESSIONS_PER_YEAR } else { w * 5 })
                .or_else(|| capture_number(&DAYS, text).filter(|d| *d > 0))
                .unwrap_or(SESSIONS_PER_YEAR);
            let base = TrendScreen::peak_drop();
            let threshold = capture_number(&PERCENT, text).unwrap_or(base.threshold());
            return Some(base.with(days, threshold));
        }

        if text.contains(keywords_ko::RECENT) && Self::matches_any(text, keywords_ko::RISE) {
            let base = TrendScreen::recent_rise();
            let days = capture_number(&RECENT_DAYS, text)
                .filter(|d| *d > 0)
                .unwrap_or(base.days());
            let threshold = capture_number(&PERCENT, text).unwrap_or(base.threshold());
            return Some(base.with(days, threshold));
        }

        None
    }

    fn extract_limit(text: &str) -> Option<usize> {
        capture_number(&LIMIT, text).filter(|n| *n > 0)
    }

    /// Check if text contains any of the keywords
    fn matches_any(text: &str, keywords: &[&str]) -> bool {
        keywords.iter().any(|kw| text.contains(kw))
    }
}

fn capture_number<T: std::str::FromStr>(pattern: &Regex, text: &str) -> Option<T> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[async_trait]
impl Agent<QueryContext> for QueryUnderstander {
    type Output = StageOutput;

    async fn process(&self, context: &mut QueryContext) -> AgentResult<StageOutput> {
        Ok(StageOutput::Intent(self.understand(&context.query)))
    }

    fn name(&self) -> &str {
        "query_understander"
    }
}
