//! End-to-end query pipeline

use std::sync::Arc;

use agent_workflow::{StageStep, Workflow};
use serde::Serialize;
use tracing::Instrument;

use crate::ambiguity::{AmbiguityChecker, ClarificationOption};
use crate::config::MarketConfig;
use crate::context::{QueryContext, StageOutput, StageResults};
use crate::data::DataAccess;
use crate::error::{MarketError, Result};
use crate::handlers::{
    AdvancedAnalytics, Analyzer, HandlerStage, Screener, Services, SignalDetector, TrendScreener,
};
use crate::intent::{Intent, QueryUnderstander, Today};
use crate::summarizer::{Narrator, Summarizer};
use crate::symbols::{SymbolResolver, SymbolTable};

const NO_RESPONSE: &str = "응답 없음";

/// Outward-facing result of one query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Answer {
        response: String,
        intent: Option<Intent>,
        intermediate: StageResults,
    },
    Clarification {
        clarification_needed: bool,
        response: String,
        options: Vec<ClarificationOption>,
    },
    Failure {
        error: String,
        query: String,
    },
}

impl Response {
    /// Text to show the user
    pub fn text(&self) -> &str {
        match self {
            Self::Answer { response, .. } | Self::Clarification { response, .. } => response,
            Self::Failure { error, .. } => error,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    fn failure(error: impl ToString, query: &str) -> Self {
        Self::Failure {
            error: error.to_string(),
            query: query.to_string(),
        }
    }
}

/// Runs understand, ambiguity check, handlers and summary over one context
///
/// Stages run strictly in order. A failing stage is logged and the next one
/// runs; a clarification request stops the run before any handler.
pub struct Orchestrator {
    workflow: Workflow<QueryContext>,
}

impl Orchestrator {
    pub fn builder(config: MarketConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Stage names in execution order
    pub fn stages(&self) -> Vec<&str> {
        self.workflow.stage_names()
    }

    pub async fn run(&self, query: &str) -> Response {
        if query.trim().is_empty() {
            return Response::failure(MarketError::InvalidQuery("query is empty".to_string()), query);
        }

        let mut context = QueryContext::new(query);
        let span = tracing::info_span!("query", id = %context.id);

        let report = match self.workflow.execute(&mut context).instrument(span).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "pipeline aborted");
                return Response::failure(e, query);
            }
        };
        tracing::info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            halted_at = ?report.halted_at,
            "pipeline finished"
        );

        if let Some(verdict) = context.clarification.take() {
            return Response::Clarification {
                clarification_needed: true,
                response: verdict.message,
                options: verdict.options,
            };
        }

        let response = context
            .summary()
            .map_or_else(|| NO_RESPONSE.to_string(), |s| s.response.clone());
        Response::Answer {
            response,
            intent: context.intent,
            intermediate: context.results,
        }
    }
}

/// Assembles an [`Orchestrator`] and its collaborators
pub struct OrchestratorBuilder {
    config: MarketConfig,
    data: Option<Arc<dyn DataAccess>>,
    symbols: Option<Arc<SymbolTable>>,
    narrator: Option<Arc<dyn Narrator>>,
    today: Today,
}

impl OrchestratorBuilder {
    pub fn new(config: MarketConfig) -> Self {
        Self {
            config,
            data: None,
            symbols: None,
            narrator: None,
            today: Today::System,
        }
    }

    /// Market data source; required
    pub fn data(mut self, data: Arc<dyn DataAccess>) -> Self {
        self.data = Some(data);
        self
    }

    /// Symbol table; defaults to the configured CSV or the bundled table
    pub fn symbols(mut self, symbols: Arc<SymbolTable>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn narrator(mut self, narrator: Arc<dyn Narrator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn today(mut self, today: Today) -> Self {
        self.today = today;
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;
        let data = self
            .data
            .ok_or_else(|| MarketError::ConfigError("a data source is required".to_string()))?;
        let symbols = match self.symbols {
            Some(symbols) => symbols,
            None => Arc::new(match &self.config.symbol_table_path {
                Some(path) => SymbolTable::from_path(path)?,
                None => SymbolTable::bundled()?,
            }),
        };
        tracing::debug!(symbols = symbols.len(), "symbol table ready");

        let config = Arc::new(self.config);
        let services = Services::new(Arc::clone(&config), data, Arc::clone(&symbols), self.today);
        let resolver = SymbolResolver::new(symbols, config.fuzzy_cutoff);
        let understander = QueryUnderstander::new(resolver, self.today)
            .with_breakout_defaults(config.default_ma_period, config.default_breakout_threshold);
        let summarizer = match self.narrator {
            Some(narrator) => Summarizer::with_narrator(narrator),
            None => Summarizer::new(),
        };

        let stages: Vec<StageStep<QueryContext>> = vec![
            Arc::new(understander),
            Arc::new(AmbiguityChecker::new()),
            Arc::new(HandlerStage(Analyzer::new(services.clone()))),
            Arc::new(HandlerStage(Screener::new(services.clone()))),
            Arc::new(HandlerStage(SignalDetector::new(services.clone()))),
            Arc::new(HandlerStage(AdvancedAnalytics::new(services.clone()))),
            Arc::new(HandlerStage(TrendScreener::new(services))),
            Arc::new(summarizer),
        ];

        let workflow = stages
            .into_iter()
            .fold(Workflow::builder(), |builder, stage| builder.add_stage(stage))
            .deadline(config.pipeline_deadline)
            .build()?;

        Ok(Orchestrator { workflow })
    }
}

/// Stage output of the named stage in a successful answer
pub fn stage_output<'a>(response: &'a Response, stage: &str) -> Option<&'a StageOutput> {
    match response {
        Response::Answer { intermediate, .. } => intermediate.get(stage),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataPool, MockDataAccess, MovingAverageSnapshot};
    use crate::handlers::HandlerOutcome;
    use crate::intent::{TaskType, VolumeDirection};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::time::Duration;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn orchestrator(data: impl DataAccess + 'static, today: NaiveDate) -> Orchestrator {
        let config = MarketConfig::builder()
            .screening_universe(["005930", "000660", "035420"])
            .build()
            .unwrap();
        tokio_test::assert_ok!(
            Orchestrator::builder(config)
                .data(Arc::new(data))
                .today(Today::Fixed(today))
                .build()
        )
    }

    #[test]
    fn test_stage_order() {
        let orchestrator = orchestrator(DataPool::new(), day(2024, 1, 17));
        assert_eq!(
            orchestrator.stages(),
            [
                "query_understander",
                "ambiguity_checker",
                "analyzer",
                "screener",
                "signal_detector",
                "advanced_analytics",
                "trend_screener",
                "summarizer"
            ]
        );
    }

    #[test]
    fn test_build_requires_data() {
        let result = Orchestrator::builder(MarketConfig::default()).build();
        assert!(matches!(result, Err(MarketError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_scenario_a_screening_intent() {
        let mut pool = DataPool::new();
        pool.insert_volume("005930.KS", day(2024, 1, 12), 1_000)
            .insert_volume("005930.KS", day(2024, 1, 15), 1_800)
            .insert_volume("000660.KS", day(2024, 1, 12), 1_000)
            .insert_volume("000660.KS", day(2024, 1, 15), 1_200);

        let response = orchestrator(pool, day(2024, 1, 17))
            .run("2024-01-15 기준 거래량이 50% 이상 증가한 종목")
            .await;

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value["intent"],
            json!({
                "task": "screening",
                "date": "2024-01-15",
                "condition": {"volume_direction": "up", "volume_change": "50%"}
            })
        );
        assert_eq!(
            response.text(),
            "2024-01-15 기준 전날 대비 거래량이 50% 이상 증가한 종목 1개를 찾았습니다.\n\n종목 목록:\n1. 삼성전자"
        );
        assert_eq!(value["intermediate"]["analyzer"]["status"], "skipped");
        assert_eq!(value["intermediate"]["screener"]["status"], "judgment");
    }

    #[tokio::test]
    async fn test_scenario_b_simple_inquiry() {
        let mut pool = DataPool::new();
        pool.insert_price("005930.KS", day(2024, 1, 12), 73_400.0);

        // Monday; yesterday rolls back to Friday
        let response = orchestrator(pool, day(2024, 1, 15)).run("어제 삼성전자 주가").await;

        let Response::Answer { intent: Some(intent), response, .. } = &response else {
            panic!("expected answer, got {response:?}");
        };
        assert_eq!(intent.task, TaskType::SimpleInquiry);
        assert_eq!(intent.date, Some(day(2024, 1, 12)));
        let symbol = intent.symbol.as_ref().unwrap();
        assert_eq!(symbol.raw.as_deref(), Some("삼성전자"));
        assert_eq!(symbol.exchange_code.as_deref(), Some("005930"));
        assert_eq!(symbol.provider_code.as_deref(), Some("005930.KS"));
        assert_eq!(response, "삼성전자의 2024-01-12 시가는 73,400원입니다.");
    }

    #[tokio::test]
    async fn test_scenario_c_clarification_halts_before_handlers() {
        let mut data = MockDataAccess::new();
        data.expect_fetch_price().times(0);
        data.expect_fetch_volume().times(0);
        data.expect_fetch_rsi().times(0);

        let response = orchestrator(data, day(2024, 1, 17)).run("어떤 종목이 좋아?").await;

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["clarification_needed"], true);
        assert_eq!(value["response"], "어떤 종류의 주식을 찾으시나요?");
        assert_eq!(value["options"].as_array().map(Vec::len), Some(2));
        assert!(value.get("intermediate").is_none());
    }

    #[tokio::test]
    async fn test_scenario_d_screener_without_direction() {
        let response = orchestrator(DataPool::new(), day(2024, 1, 17))
            .run("2024-01-15 거래량 50% 이상 종목")
            .await;

        let Response::Answer { intent: Some(intent), response: text, .. } = &response else {
            panic!("expected answer, got {response:?}");
        };
        assert!(intent.condition.volume_direction.is_none());
        assert!(matches!(
            stage_output(&response, "screener"),
            Some(StageOutput::Handler(HandlerOutcome::Error { .. }))
        ));
        assert!(text.starts_with("죄송합니다."));
    }

    #[tokio::test]
    async fn test_scenario_e_breakout_sorted() {
        let date = day(2024, 1, 17);
        let mut pool = DataPool::new();
        pool.insert_moving_average("005930.KS", date, MovingAverageSnapshot::new(107.0, 100.0))
            .insert_moving_average("000660.KS", date, MovingAverageSnapshot::new(112.0, 100.0))
            .insert_moving_average("035420.KS", date, MovingAverageSnapshot::new(103.0, 100.0));

        let response = orchestrator(pool, date).run("20일 이동평균 5% 돌파 종목").await;
        let value = serde_json::to_value(&response).unwrap();
        let judgment = &value["intermediate"]["signal_detector"]["judgment"];

        assert_eq!(judgment["judgment_type"], "signal");
        assert_eq!(
            judgment["matches"],
            json!([
                {"name": "SK하이닉스", "code": "000660", "current_price": 112.0, "moving_average": 100.0, "breakout_ratio": 12.0},
                {"name": "삼성전자", "code": "005930", "current_price": 107.0, "moving_average": 100.0, "breakout_ratio": 7.0}
            ])
        );
        assert_eq!(value["intermediate"]["screener"]["status"], "skipped");
    }

    #[tokio::test]
    async fn test_scenario_f_menu_value_runs_trend_screen() {
        let mut pool = DataPool::new();
        let mut rising = vec![100.0; 19];
        rising.push(120.0);
        pool.insert_closes("005930.KS", rising)
            .insert_closes("000660.KS", vec![100.0; 20]);

        let response = orchestrator(pool, day(2024, 1, 17)).run("recent_rise").await;
        let value = serde_json::to_value(&response).unwrap();
        let judgment = &value["intermediate"]["trend_screener"]["judgment"];

        assert_eq!(value["intent"]["task"], "screening");
        assert_eq!(judgment["judgment_type"], "trend");
        assert_eq!(judgment["kind"], "recent_rise");
        assert_eq!(judgment["total_found"], 1);
        assert_eq!(value["intermediate"]["screener"]["status"], "skipped");
        assert!(response.text().starts_with(
            "최근 10일간 10% 이상 상승한 종목 1개를 찾았습니다.\n\n종목 목록:\n1. 삼성전자\n\n다른 기준으로 찾아보기:"
        ));
    }

    #[tokio::test]
    async fn test_blank_query_is_failure() {
        let response = orchestrator(DataPool::new(), day(2024, 1, 17)).run("   ").await;
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"error": "Invalid query: query is empty", "query": "   "})
        );
    }

    struct SlowData;

    #[async_trait]
    impl DataAccess for SlowData {
        async fn fetch_price(&self, _: &str, _: NaiveDate) -> crate::error::FetchResult<f64> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1.0)
        }
        async fn fetch_volume(&self, _: &str, _: NaiveDate) -> crate::error::FetchResult<u64> {
            Ok(0)
        }
        async fn fetch_rsi(&self, _: &str, _: NaiveDate, _: usize) -> crate::error::FetchResult<f64> {
            Ok(0.0)
        }
        async fn fetch_moving_average(
            &self,
            _: &str,
            _: NaiveDate,
            _: usize,
        ) -> crate::error::FetchResult<MovingAverageSnapshot> {
            Ok(MovingAverageSnapshot::new(1.0, 1.0))
        }
        async fn fetch_closing_prices(
            &self,
            _: &str,
            _: NaiveDate,
            _: usize,
        ) -> crate::error::FetchResult<Vec<f64>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_deadline_yields_failure() {
        let config = MarketConfig::builder()
            .pipeline_deadline(Duration::from_millis(50))
            .build()
            .unwrap();
        let orchestrator = Orchestrator::builder(config)
            .data(Arc::new(SlowData))
            .today(Today::Fixed(day(2024, 1, 17)))
            .build()
            .unwrap();

        let response = orchestrator.run("삼성전자 주가").await;
        assert!(response.is_failure());
        assert!(response.text().starts_with("pipeline deadline exceeded"));
    }

    #[tokio::test]
    async fn test_volume_direction_round_trip_through_pipeline() {
        let response = orchestrator(DataPool::new(), day(2024, 1, 17))
            .run("어제 거래량이 30% 감소한 종목 5개")
            .await;
        let Response::Answer { intent: Some(intent), .. } = &response else {
            panic!("expected answer, got {response:?}");
        };
        assert_eq!(intent.condition.volume_direction, Some(VolumeDirection::Down));
        assert_eq!(intent.limit, Some(5));
    }
}
