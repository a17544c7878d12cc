//! Volume screening over the candidate universe

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use super::{HandlerOutcome, Judgment, Services, TaskHandler, round_to};
use crate::data::first_matches;
use crate::intent::{Intent, VolumeDirection, previous_trading_day, trading_day_adjust};

const NO_DIRECTION: &str = "거래량 증감 방향(증가/감소)을 판단할 수 없습니다.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenedStock {
    pub name: String,
    pub code: String,
    pub previous_volume: u64,
    pub current_volume: u64,
    pub change_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreeningJudgment {
    pub date: NaiveDate,
    pub previous_date: NaiveDate,
    pub direction: VolumeDirection,
    pub threshold: u32,
    pub matches: Vec<ScreenedStock>,
    pub summary: String,
}

/// Screening parameters shared by every candidate task
#[derive(Debug, Clone, Copy)]
struct Criteria {
    date: NaiveDate,
    previous_date: NaiveDate,
    direction: VolumeDirection,
    threshold: u32,
    rsi_floor: Option<u32>,
    rsi_period: usize,
}

impl Criteria {
    fn volume_matches(&self, change: f64) -> bool {
        let directed = match self.direction {
            VolumeDirection::Up => change,
            VolumeDirection::Down => -change,
        };
        directed >= f64::from(self.threshold)
    }
}

/// Finds symbols whose volume moved by at least a threshold between two days
///
/// Candidates are consumed in universe order, so the first `limit` matches
/// are deterministic. Fetches already running when the limit is reached
/// finish in the background and are discarded.
pub struct Screener {
    services: Services,
}

impl Screener {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    fn criteria(&self, intent: &Intent, direction: VolumeDirection) -> Criteria {
        let date = intent
            .date
            .or_else(|| intent.date_range.map(|r| r.to))
            .unwrap_or_else(|| trading_day_adjust(self.services.today.date()));
        let previous_date = intent
            .date_range
            .map_or_else(|| previous_trading_day(date), |r| r.from);

        Criteria {
            date,
            previous_date,
            direction,
            threshold: intent.condition.volume_change.unwrap_or(0),
            rsi_floor: intent.condition.rsi,
            rsi_period: self.services.config.rsi_period,
        }
    }
}

async fn screen_one(
    data: Arc<dyn crate::data::DataAccess>,
    name: String,
    code: String,
    exchange_code: String,
    criteria: Criteria,
) -> Option<ScreenedStock> {
    let (current, previous) = tokio::join!(
        data.fetch_volume(&code, criteria.date),
        data.fetch_volume(&code, criteria.previous_date)
    );
    let (current_volume, previous_volume) = match (current, previous) {
        (Ok(c), Ok(p)) if p > 0 => (c, p),
        (Err(e), _) | (_, Err(e)) => {
            tracing::debug!(%code, error = %e, "volume unavailable");
            return None;
        }
        _ => return None,
    };

    let change = (current_volume as f64 / previous_volume as f64 - 1.0) * 100.0;
    if !criteria.volume_matches(change) {
        return None;
    }

    let rsi = match criteria.rsi_floor {
        Some(floor) => {
            let rsi = data
                .fetch_rsi(&code, criteria.date, criteria.rsi_period)
                .await
                .ok()?;
            if rsi < f64::from(floor) {
                return None;
            }
            Some(round_to(rsi, 2))
        }
        None => None,
    };

    Some(ScreenedStock {
        name,
        code: exchange_code,
        previous_volume,
        current_volume,
        change_percent: round_to(change, 2),
        rsi,
    })
}

#[async_trait]
impl TaskHandler for Screener {
    fn name(&self) -> &'static str {
        "screener"
    }

    fn applies(&self, intent: &Intent) -> bool {
        intent.is_screening()
            && intent.condition.breakout.is_none()
            && intent.condition.analytics.is_none()
            && intent.condition.trend.is_none()
    }

    async fn handle(&self, intent: &Intent) -> HandlerOutcome {
        let Some(direction) = intent.condition.volume_direction else {
            return HandlerOutcome::error(NO_DIRECTION);
        };

        let criteria = self.criteria(intent, direction);
        let limit = intent.limit.unwrap_or(self.services.config.default_limit);
        let candidates: Vec<_> = self
            .services
            .config
            .screening_universe
            .iter()
            .map(|code| self.services.symbols.describe(code))
            .collect();

        tracing::info!(
            candidates = candidates.len(),
            limit,
            date = %criteria.date,
            previous = %criteria.previous_date,
            "screening volume change"
        );

        let data = Arc::clone(&self.services.data);
        let matches = first_matches(
            candidates,
            self.services.config.max_concurrency,
            limit,
            |entry| {
                screen_one(
                    Arc::clone(&data),
                    entry.name,
                    entry.provider_code,
                    entry.exchange_code,
                    criteria,
                )
            },
        )
        .await;

        let movement = match direction {
            VolumeDirection::Up => "증가",
            VolumeDirection::Down => "감소",
        };
        let lead = format!(
            "{} 기준 전날 대비 거래량이 {}% 이상 {movement}한 종목",
            criteria.date, criteria.threshold
        );
        let summary = if matches.is_empty() {
            format!("{lead}은 없습니다.")
        } else {
            format!("{lead} {}개를 찾았습니다.", matches.len())
        };

        HandlerOutcome::judged(Judgment::Screening(ScreeningJudgment {
            date: criteria.date,
            previous_date: criteria.previous_date,
            direction,
            threshold: criteria.threshold,
            matches,
            summary,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketConfig;
    use crate::data::{DataPool, MockDataAccess};
    use crate::intent::{DateRange, TaskType, Today};
    use crate::symbols::SymbolTable;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn services(data: impl crate::data::DataAccess + 'static, universe: &[&str]) -> Services {
        let config = MarketConfig::builder()
            .screening_universe(universe.iter().copied())
            .build()
            .unwrap();
        Services::new(
            Arc::new(config),
            Arc::new(data),
            Arc::new(SymbolTable::bundled().unwrap()),
            Today::Fixed(day(2024, 1, 17)),
        )
    }

    fn volume_intent(direction: Option<VolumeDirection>, percent: u32) -> Intent {
        let mut intent = Intent::new(TaskType::Screening);
        intent.date = Some(day(2024, 1, 15));
        intent.condition.volume_change = Some(percent);
        intent.condition.volume_direction = direction;
        intent
    }

    fn pool() -> DataPool {
        let mut pool = DataPool::new();
        let (today, prev) = (day(2024, 1, 15), day(2024, 1, 12));
        pool.insert_volume("005930.KS", prev, 1_000)
            .insert_volume("005930.KS", today, 2_000)
            .insert_volume("000660.KS", prev, 1_000)
            .insert_volume("000660.KS", today, 1_100)
            .insert_volume("035420.KS", prev, 1_000)
            .insert_volume("035420.KS", today, 1_600)
            .insert_volume("035720.KS", prev, 1_000)
            .insert_volume("035720.KS", today, 300);
        pool
    }

    #[tokio::test]
    async fn test_missing_direction_is_error() {
        let mut mock = MockDataAccess::new();
        mock.expect_fetch_volume().times(0);

        let screener = Screener::new(services(mock, &["005930"]));
        let outcome = screener.handle(&volume_intent(None, 50)).await;
        assert_eq!(outcome, HandlerOutcome::error(NO_DIRECTION));
    }

    #[tokio::test]
    async fn test_increase_screening_keeps_universe_order() {
        let screener = Screener::new(services(pool(), &["005930", "000660", "035420", "035720"]));
        let outcome = screener
            .handle(&volume_intent(Some(VolumeDirection::Up), 50))
            .await;

        let Some(Judgment::Screening(judgment)) = outcome.judgment() else {
            panic!("expected screening judgment, got {outcome:?}");
        };
        let names: Vec<_> = judgment.matches.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["삼성전자", "NAVER"]);
        assert_eq!(judgment.matches[0].code, "005930");
        assert!((judgment.matches[0].change_percent - 100.0).abs() < f64::EPSILON);
        assert_eq!(judgment.previous_date, day(2024, 1, 12));
        assert_eq!(
            judgment.summary,
            "2024-01-15 기준 전날 대비 거래량이 50% 이상 증가한 종목 2개를 찾았습니다."
        );
    }

    #[tokio::test]
    async fn test_decrease_screening() {
        let screener = Screener::new(services(pool(), &["005930", "000660", "035420", "035720"]));
        let outcome = screener
            .handle(&volume_intent(Some(VolumeDirection::Down), 50))
            .await;

        let Some(Judgment::Screening(judgment)) = outcome.judgment() else {
            panic!("expected screening judgment, got {outcome:?}");
        };
        assert_eq!(judgment.matches.len(), 1);
        assert_eq!(judgment.matches[0].name, "카카오");
    }

    #[tokio::test]
    async fn test_limit_enforced() {
        let screener = Screener::new(services(pool(), &["005930", "000660", "035420", "035720"]));
        let mut intent = volume_intent(Some(VolumeDirection::Up), 0);
        intent.limit = Some(1);

        let outcome = screener.handle(&intent).await;
        let Some(Judgment::Screening(judgment)) = outcome.judgment() else {
            panic!("expected screening judgment, got {outcome:?}");
        };
        assert_eq!(judgment.matches.len(), 1);
        assert_eq!(judgment.matches[0].name, "삼성전자");
    }

    #[tokio::test]
    async fn test_threshold_compares_unrounded_change() {
        // 49.996% displays as 50.0 but does not clear a 50% threshold
        let mut mock = MockDataAccess::new();
        mock.expect_fetch_volume()
            .returning(|_, date| Ok(if date == day(2024, 1, 15) { 149_996 } else { 100_000 }));
        let data: Arc<dyn crate::data::DataAccess> = Arc::new(mock);

        let criteria = Criteria {
            date: day(2024, 1, 15),
            previous_date: day(2024, 1, 12),
            direction: VolumeDirection::Up,
            threshold: 50,
            rsi_floor: None,
            rsi_period: 14,
        };
        let screen = |threshold| {
            screen_one(
                Arc::clone(&data),
                "삼성전자".to_string(),
                "005930.KS".to_string(),
                "005930".to_string(),
                Criteria { threshold, ..criteria },
            )
        };

        assert!(screen(50).await.is_none());
        let hit = screen(49).await.unwrap();
        assert!((hit.change_percent - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_rsi_floor_filters() {
        let mut data = pool();
        data.insert_rsi("005930.KS", day(2024, 1, 15), 55.0)
            .insert_rsi("035420.KS", day(2024, 1, 15), 74.321);

        let screener = Screener::new(services(data, &["005930", "035420"]));
        let mut intent = volume_intent(Some(VolumeDirection::Up), 50);
        intent.condition.rsi = Some(70);

        let outcome = screener.handle(&intent).await;
        let Some(Judgment::Screening(judgment)) = outcome.judgment() else {
            panic!("expected screening judgment, got {outcome:?}");
        };
        assert_eq!(judgment.matches.len(), 1);
        assert_eq!(judgment.matches[0].rsi, Some(74.32));
    }

    #[tokio::test]
    async fn test_no_matches_still_judged() {
        let screener = Screener::new(services(DataPool::new(), &["005930"]));
        let outcome = screener
            .handle(&volume_intent(Some(VolumeDirection::Up), 50))
            .await;

        let Some(Judgment::Screening(judgment)) = outcome.judgment() else {
            panic!("expected screening judgment, got {outcome:?}");
        };
        assert!(judgment.matches.is_empty());
        assert!(judgment.summary.ends_with("증가한 종목은 없습니다."));
    }

    #[tokio::test]
    async fn test_date_range_sets_both_days() {
        let mut mock = MockDataAccess::new();
        mock.expect_fetch_volume()
            .withf(|_, date| *date == day(2024, 1, 16) || *date == day(2024, 1, 15))
            .times(2)
            .returning(|_, date| Ok(if date == day(2024, 1, 16) { 300 } else { 100 }));

        let mut intent = volume_intent(Some(VolumeDirection::Up), 100);
        intent.date = None;
        intent.date_range = Some(DateRange {
            from: day(2024, 1, 15),
            to: day(2024, 1, 16),
        });

        let outcome = Screener::new(services(mock, &["005930"])).handle(&intent).await;
        let Some(Judgment::Screening(judgment)) = outcome.judgment() else {
            panic!("expected screening judgment, got {outcome:?}");
        };
        assert!((judgment.matches[0].change_percent - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_applicability() {
        let screener = Screener::new(services(DataPool::new(), &["005930"]));
        let mut intent = Intent::new(TaskType::Screening);
        assert!(screener.applies(&intent));

        intent.condition.breakout = Some(crate::intent::BreakoutCondition {
            period: 20,
            threshold: 5.0,
        });
        assert!(!screener.applies(&intent));
        assert!(!screener.applies(&Intent::new(TaskType::SimpleInquiry)));

        let mut trend = Intent::new(TaskType::Screening);
        trend.condition.trend = Some(crate::intent::TrendScreen::recent_rise());
        assert!(!screener.applies(&trend));
    }
}
