//! Single-symbol metric lookup and condition check

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use super::{HandlerOutcome, Judgment, Services, TaskHandler, round_to, with_thousands};
use crate::intent::{
    Condition, Intent, TaskType, VolumeDirection, previous_trading_day, trading_day_adjust,
};
use crate::symbols::{MAPPING_FAILED, SymbolRef};

const NO_RSI: &str = "RSI 데이터를 찾을 수 없습니다.";
const NO_VOLUME: &str = "거래량 비교에 필요한 데이터 부족";
const NO_PRICE: &str = "시가 정보 없음";

/// The metric an analysis looked at
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum AnalysisMetric {
    Rsi {
        rsi: f64,
        threshold: u32,
    },
    VolumeChange {
        today_volume: u64,
        previous_volume: u64,
        change_percent: f64,
        threshold: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<VolumeDirection>,
    },
    Price {
        price: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisJudgment {
    pub symbol: String,
    pub code: String,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub metric: AnalysisMetric,
    /// `None` for plain lookups
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_met: Option<bool>,
    pub explanation: String,
}

/// Answers simple inquiries about one resolved symbol
///
/// Exactly one data point family is fetched per query: RSI when an RSI
/// condition is present, otherwise volumes when a volume condition is
/// present, otherwise the opening price.
pub struct Analyzer {
    services: Services,
}

impl Analyzer {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn rsi(&self, name: &str, code: &str, date: NaiveDate, threshold: u32) -> HandlerOutcome {
        let rsi = match self
            .services
            .data
            .fetch_rsi(code, date, self.services.config.rsi_period)
            .await
        {
            Ok(rsi) => round_to(rsi, 2),
            Err(e) => {
                tracing::debug!(code, error = %e, "rsi unavailable");
                return HandlerOutcome::no_judgment(NO_RSI);
            }
        };

        let met = rsi > f64::from(threshold);
        let verdict = if met { "초과" } else { "이하" };
        HandlerOutcome::judged(Judgment::Analysis(AnalysisJudgment {
            symbol: name.to_string(),
            code: code.to_string(),
            date,
            metric: AnalysisMetric::Rsi { rsi, threshold },
            condition_met: Some(met),
            explanation: format!("{name}의 {date} RSI는 {rsi}이며 기준값 {threshold} {verdict}입니다."),
        }))
    }

    async fn volume_change(
        &self,
        name: &str,
        code: &str,
        date: NaiveDate,
        direction: Option<VolumeDirection>,
        threshold: u32,
    ) -> HandlerOutcome {
        let previous_date = previous_trading_day(date);
        let data = Arc::clone(&self.services.data);
        let (today, previous) = tokio::join!(
            data.fetch_volume(code, date),
            data.fetch_volume(code, previous_date)
        );

        let (today_volume, previous_volume) = match (today, previous) {
            (Ok(t), Ok(p)) if p > 0 => (t, p),
            _ => return HandlerOutcome::no_judgment(NO_VOLUME),
        };

        let change = round_to((today_volume as f64 / previous_volume as f64 - 1.0) * 100.0, 2);
        let directed = match direction {
            Some(VolumeDirection::Down) => -change,
            _ => change,
        };
        let met = directed > f64::from(threshold);
        let movement = if change < 0.0 { "감소" } else { "증가" };
        let verdict = if met { "초과" } else { "초과하지 않음" };

        HandlerOutcome::judged(Judgment::Analysis(AnalysisJudgment {
            symbol: name.to_string(),
            code: code.to_string(),
            date,
            metric: AnalysisMetric::VolumeChange {
                today_volume,
                previous_volume,
                change_percent: change,
                threshold,
                direction,
            },
            condition_met: Some(met),
            explanation: format!(
                "{name}의 {date} 거래량은 전일 대비 {}% {movement}하였고, {threshold}% 기준을 {verdict}입니다.",
                change.abs()
            ),
        }))
    }

    async fn price(&self, name: &str, code: &str, date: NaiveDate) -> HandlerOutcome {
        let Ok(price) = self.services.data.fetch_price(code, date).await else {
            return HandlerOutcome::no_judgment(NO_PRICE);
        };

        HandlerOutcome::judged(Judgment::Analysis(AnalysisJudgment {
            symbol: name.to_string(),
            code: code.to_string(),
            date,
            metric: AnalysisMetric::Price { price },
            condition_met: None,
            explanation: format!("{name}의 {date} 시가는 {}원입니다.", with_thousands(price)),
        }))
    }
}

#[async_trait]
impl TaskHandler for Analyzer {
    fn name(&self) -> &'static str {
        "analyzer"
    }

    fn applies(&self, intent: &Intent) -> bool {
        intent.task == TaskType::SimpleInquiry
    }

    async fn handle(&self, intent: &Intent) -> HandlerOutcome {
        let Some((symbol, code)) = intent
            .symbol
            .as_ref()
            .and_then(|s| s.provider_code.clone().map(|code| (s, code)))
            .filter(|(s, _)| s.is_resolved())
        else {
            let reason = intent
                .symbol
                .as_ref()
                .and_then(|s: &SymbolRef| s.error.clone())
                .unwrap_or_else(|| MAPPING_FAILED.to_string());
            return HandlerOutcome::no_judgment(reason);
        };

        let name = symbol.display_name().to_string();
        let date = intent
            .date
            .unwrap_or_else(|| trading_day_adjust(self.services.today.date()));

        tracing::debug!(symbol = %name, %code, %date, "analyzing");
        match intent.condition.primary() {
            Some(Condition::RsiAbove(threshold)) => self.rsi(&name, &code, date, threshold).await,
            Some(Condition::VolumeChange { direction, percent }) => {
                self.volume_change(&name, &code, date, direction, percent)
                    .await
            }
            None => self.price(&name, &code, date).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketConfig;
    use crate::data::{DataPool, MockDataAccess};
    use crate::error::FetchError;
    use crate::intent::Today;
    use crate::symbols::SymbolTable;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn services(data: impl crate::data::DataAccess + 'static) -> Services {
        Services::new(
            Arc::new(MarketConfig::default()),
            Arc::new(data),
            Arc::new(SymbolTable::bundled().unwrap()),
            Today::Fixed(day(2024, 1, 17)),
        )
    }

    fn samsung_intent() -> Intent {
        let table = SymbolTable::bundled().unwrap();
        let mut intent = Intent::new(TaskType::SimpleInquiry);
        intent.symbol = Some(SymbolRef::resolved("삼성전자", table.get("삼성전자").unwrap()));
        intent.date = Some(day(2024, 1, 16));
        intent
    }

    #[tokio::test]
    async fn test_rsi_condition_only_fetches_rsi() {
        let mut mock = MockDataAccess::new();
        mock.expect_fetch_rsi()
            .withf(|code, date, period| code == "005930.KS" && *date == day(2024, 1, 16) && *period == 14)
            .times(1)
            .returning(|_, _, _| Ok(72.456));
        mock.expect_fetch_price().times(0);
        mock.expect_fetch_volume().times(0);

        let mut intent = samsung_intent();
        intent.condition.rsi = Some(70);

        let outcome = Analyzer::new(services(mock)).handle(&intent).await;
        let Some(Judgment::Analysis(judgment)) = outcome.judgment() else {
            panic!("expected analysis judgment, got {outcome:?}");
        };
        assert_eq!(judgment.condition_met, Some(true));
        assert_eq!(
            judgment.explanation,
            "삼성전자의 2024-01-16 RSI는 72.46이며 기준값 70 초과입니다."
        );
    }

    #[tokio::test]
    async fn test_missing_rsi_is_no_judgment() {
        let mut mock = MockDataAccess::new();
        mock.expect_fetch_rsi()
            .returning(|code, _, _| Err(FetchError::unavailable(code, "no data")));

        let mut intent = samsung_intent();
        intent.condition.rsi = Some(70);

        let outcome = Analyzer::new(services(mock)).handle(&intent).await;
        assert_eq!(outcome, HandlerOutcome::no_judgment(NO_RSI));
    }

    #[tokio::test]
    async fn test_volume_change_uses_previous_trading_day() {
        let mut pool = DataPool::new();
        pool.insert_volume("005930.KS", day(2024, 1, 15), 10_000_000)
            .insert_volume("005930.KS", day(2024, 1, 12), 8_000_000);

        let mut intent = samsung_intent();
        intent.date = Some(day(2024, 1, 15));
        intent.condition.volume_change = Some(20);
        intent.condition.volume_direction = Some(VolumeDirection::Up);

        let outcome = Analyzer::new(services(pool)).handle(&intent).await;
        let Some(Judgment::Analysis(judgment)) = outcome.judgment() else {
            panic!("expected analysis judgment, got {outcome:?}");
        };
        assert_eq!(judgment.condition_met, Some(true));
        assert_eq!(
            judgment.explanation,
            "삼성전자의 2024-01-15 거래량은 전일 대비 25% 증가하였고, 20% 기준을 초과입니다."
        );
    }

    #[tokio::test]
    async fn test_volume_decrease_direction() {
        let mut pool = DataPool::new();
        pool.insert_volume("005930.KS", day(2024, 1, 16), 6_000_000)
            .insert_volume("005930.KS", day(2024, 1, 15), 10_000_000);

        let mut intent = samsung_intent();
        intent.condition.volume_change = Some(50);
        intent.condition.volume_direction = Some(VolumeDirection::Down);

        let outcome = Analyzer::new(services(pool)).handle(&intent).await;
        let Some(Judgment::Analysis(judgment)) = outcome.judgment() else {
            panic!("expected analysis judgment, got {outcome:?}");
        };
        assert_eq!(judgment.condition_met, Some(false));
        assert!(judgment.explanation.contains("40% 감소"));
        assert!(judgment.explanation.ends_with("초과하지 않음입니다."));
    }

    #[tokio::test]
    async fn test_zero_previous_volume_is_no_judgment() {
        let mut pool = DataPool::new();
        pool.insert_volume("005930.KS", day(2024, 1, 16), 6_000_000)
            .insert_volume("005930.KS", day(2024, 1, 15), 0);

        let mut intent = samsung_intent();
        intent.condition.volume_change = Some(10);

        let outcome = Analyzer::new(services(pool)).handle(&intent).await;
        assert_eq!(outcome, HandlerOutcome::no_judgment(NO_VOLUME));
    }

    #[tokio::test]
    async fn test_plain_price_lookup() {
        let mut mock = MockDataAccess::new();
        mock.expect_fetch_price()
            .withf(|code, date| code == "005930.KS" && *date == day(2024, 1, 16))
            .times(1)
            .returning(|_, _| Ok(71_000.0));
        mock.expect_fetch_rsi().times(0);
        mock.expect_fetch_volume().times(0);

        let outcome = Analyzer::new(services(mock)).handle(&samsung_intent()).await;
        let Some(judgment) = outcome.judgment() else {
            panic!("expected judgment, got {outcome:?}");
        };
        assert_eq!(
            serde_json::to_value(judgment).unwrap(),
            json!({
                "judgment_type": "analysis",
                "symbol": "삼성전자",
                "code": "005930.KS",
                "date": "2024-01-16",
                "metric": "price",
                "price": 71000.0,
                "explanation": "삼성전자의 2024-01-16 시가는 71,000원입니다."
            })
        );
    }

    #[tokio::test]
    async fn test_date_defaults_to_adjusted_today() {
        let mut mock = MockDataAccess::new();
        // Today is fixed to Wednesday 2024-01-17
        mock.expect_fetch_price()
            .withf(|_, date| *date == day(2024, 1, 17))
            .returning(|_, _| Ok(70_500.0));

        let mut intent = samsung_intent();
        intent.date = None;

        let outcome = Analyzer::new(services(mock)).handle(&intent).await;
        assert!(outcome.judgment().is_some());
    }

    #[tokio::test]
    async fn test_unresolved_symbol() {
        let mut mock = MockDataAccess::new();
        mock.expect_fetch_price().times(0);

        let mut intent = Intent::new(TaskType::SimpleInquiry);
        intent.symbol = Some(SymbolRef::unresolved());

        let outcome = Analyzer::new(services(mock)).handle(&intent).await;
        assert_eq!(outcome, HandlerOutcome::no_judgment(MAPPING_FAILED));
    }

    #[test]
    fn test_applies_only_to_simple_inquiry() {
        let analyzer = Analyzer::new(services(DataPool::new()));
        assert!(analyzer.applies(&Intent::new(TaskType::SimpleInquiry)));
        assert!(!analyzer.applies(&Intent::new(TaskType::Screening)));
    }
}
