//! Recent-rise and drop-from-peak screens over the candidate universe

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use super::{HandlerOutcome, Judgment, Services, TaskHandler, round_to};
use crate::ambiguity::ClarificationOption;
use crate::data::fetch_bulk_closing_prices;
use crate::intent::{Intent, TrendScreen, period_label, trading_day_adjust};

/// Calendar slack requested on top of a rise lookback
const RISE_SLACK_DAYS: usize = 10;

/// Shortest close history a peak is taken from
const MIN_PEAK_CLOSES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendStock {
    pub name: String,
    pub code: String,
    pub current_price: f64,
    /// Close at the start of the lookback for a rise, the period high for a drop
    pub reference_price: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendJudgment {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub screen: TrendScreen,
    pub criteria: String,
    pub matches: Vec<TrendStock>,
    /// Matches before the limit was applied
    pub total_found: usize,
    pub summary: String,
    pub alternatives: Vec<ClarificationOption>,
}

/// `(current, reference, change %)` against the close `days` sessions back
///
/// The lookback is clamped to the history available.
fn recent_change(closes: &[f64], days: usize) -> Option<(f64, f64, f64)> {
    if closes.len() < 2 {
        return None;
    }
    let current = *closes.last()?;
    let back = days.clamp(1, closes.len() - 1);
    let past = closes[closes.len() - back];
    (past > 0.0).then(|| (current, past, (current - past) / past * 100.0))
}

/// `(current, peak, change %)` against the highest close
fn peak_change(closes: &[f64]) -> Option<(f64, f64, f64)> {
    if closes.len() < MIN_PEAK_CLOSES {
        return None;
    }
    let current = *closes.last()?;
    let peak = closes.iter().copied().fold(f64::MIN, f64::max);
    (peak > 0.0).then(|| (current, peak, (current - peak) / peak * 100.0))
}

/// Ranks universe symbols by recent gain or by distance below their high
pub struct TrendScreener {
    services: Services,
}

impl TrendScreener {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl TaskHandler for TrendScreener {
    fn name(&self) -> &'static str {
        "trend_screener"
    }

    fn applies(&self, intent: &Intent) -> bool {
        intent.condition.trend.is_some()
            && intent.condition.breakout.is_none()
            && intent.condition.analytics.is_none()
    }

    async fn handle(&self, intent: &Intent) -> HandlerOutcome {
        let Some(screen) = intent.condition.trend else {
            return HandlerOutcome::skipped("no trend screen");
        };

        let date = intent
            .date
            .or_else(|| intent.date_range.map(|r| r.to))
            .unwrap_or_else(|| trading_day_adjust(self.services.today.date()));
        let limit = intent.limit.unwrap_or(self.services.config.default_limit);
        let candidates: Vec<_> = self
            .services
            .config
            .screening_universe
            .iter()
            .map(|code| self.services.symbols.describe(code))
            .collect();
        let fetch_days = match screen {
            TrendScreen::RecentRise { days, .. } => days + RISE_SLACK_DAYS,
            TrendScreen::PeakDrop { days, .. } => days,
        };

        tracing::info!(
            candidates = candidates.len(),
            screen = %screen.label(),
            %date,
            "screening price trend"
        );

        let codes: Vec<String> = candidates.iter().map(|e| e.provider_code.clone()).collect();
        let closes = fetch_bulk_closing_prices(
            &self.services.data,
            &codes,
            date,
            fetch_days,
            self.services.config.max_concurrency,
        )
        .await;

        let mut matches: Vec<TrendStock> = candidates
            .into_iter()
            .filter_map(|entry| {
                let closes = closes.get(&entry.provider_code)?;
                let (current, reference, change) = match screen {
                    TrendScreen::RecentRise { days, threshold } => {
                        recent_change(closes, days).filter(|(_, _, c)| *c >= threshold)?
                    }
                    TrendScreen::PeakDrop { threshold, .. } => {
                        peak_change(closes).filter(|(_, _, c)| *c <= threshold)?
                    }
                };
                Some(TrendStock {
                    name: entry.name,
                    code: entry.exchange_code,
                    current_price: current,
                    reference_price: reference,
                    change_percent: round_to(change, 2),
                })
            })
            .collect();

        match screen {
            TrendScreen::RecentRise { .. } => {
                matches.sort_by(|a, b| b.change_percent.total_cmp(&a.change_percent));
            }
            TrendScreen::PeakDrop { .. } => {
                matches.sort_by(|a, b| a.change_percent.total_cmp(&b.change_percent));
            }
        }
        let total_found = matches.len();
        matches.truncate(limit);

        let lead = match screen {
            TrendScreen::RecentRise { days, threshold } => {
                format!("최근 {days}일간 {threshold}% 이상 상승한 종목")
            }
            TrendScreen::PeakDrop { days, threshold } => format!(
                "{} 고점 대비 {}% 이상 하락한 종목",
                period_label(days),
                threshold.abs()
            ),
        };
        let summary = if total_found == 0 {
            format!("{lead}은 없습니다.")
        } else {
            format!("{lead} {total_found}개를 찾았습니다.")
        };

        let alternatives = screen
            .presets()
            .into_iter()
            .filter(|preset| *preset != screen)
            .map(|preset| ClarificationOption::new(&preset.label(), &preset.value()))
            .collect();

        HandlerOutcome::judged(Judgment::Trend(TrendJudgment {
            date,
            screen,
            criteria: screen.label(),
            matches,
            total_found,
            summary,
            alternatives,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketConfig;
    use crate::data::DataPool;
    use crate::intent::{TaskType, Today};
    use crate::symbols::SymbolTable;
    use serde_json::json;
    use std::sync::Arc;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn screener(pool: DataPool) -> TrendScreener {
        let config = MarketConfig::builder()
            .screening_universe(["005930", "000660", "035420", "035720"])
            .build()
            .unwrap();
        TrendScreener::new(Services::new(
            Arc::new(config),
            Arc::new(pool),
            Arc::new(SymbolTable::bundled().unwrap()),
            Today::Fixed(day(2024, 1, 17)),
        ))
    }

    fn trend_intent(screen: TrendScreen) -> Intent {
        let mut intent = Intent::new(TaskType::Screening);
        intent.condition.trend = Some(screen);
        intent
    }

    /// `len` closes rising linearly from `start` to `end`
    fn ramp(start: f64, end: f64, len: usize) -> Vec<f64> {
        let step = (end - start) / (len - 1) as f64;
        (0..len).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn test_recent_change_uses_close_days_back() {
        let closes = [100.0, 90.0, 100.0, 110.0, 120.0];
        // A lookback longer than the history is clamped
        let (current, past, change) = recent_change(&closes, 10).unwrap();
        assert!((current - 120.0).abs() < f64::EPSILON);
        assert!((past - 90.0).abs() < f64::EPSILON);
        assert!((change - 33.333_333).abs() < 1e-4);

        let (_, past, _) = recent_change(&closes, 2).unwrap();
        assert!((past - 110.0).abs() < f64::EPSILON);
        assert!(recent_change(&[100.0], 5).is_none());
    }

    #[test]
    fn test_peak_change_needs_history() {
        let mut closes = vec![100.0; 9];
        assert!(peak_change(&closes).is_none());

        closes.extend([200.0, 150.0]);
        let (current, peak, change) = peak_change(&closes).unwrap();
        assert!((current - 150.0).abs() < f64::EPSILON);
        assert!((peak - 200.0).abs() < f64::EPSILON);
        assert!((change + 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_recent_rise_sorted_by_gain() {
        let mut pool = DataPool::new();
        pool.insert_closes("005930.KS", ramp(100.0, 130.0, 20))
            .insert_closes("000660.KS", ramp(100.0, 150.0, 20))
            .insert_closes("035420.KS", ramp(100.0, 101.0, 20))
            .insert_closes("035720.KS", ramp(150.0, 100.0, 20));

        let outcome = screener(pool)
            .handle(&trend_intent(TrendScreen::recent_rise()))
            .await;
        let Some(Judgment::Trend(judgment)) = outcome.judgment() else {
            panic!("expected trend judgment, got {outcome:?}");
        };

        let names: Vec<_> = judgment.matches.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["SK하이닉스", "삼성전자"]);
        assert!(judgment.matches[0].change_percent > judgment.matches[1].change_percent);
        assert_eq!(judgment.matches[1].code, "005930");
        assert_eq!(judgment.total_found, 2);
        assert_eq!(judgment.criteria, "최근 10일 10% 이상 상승");
        assert_eq!(judgment.summary, "최근 10일간 10% 이상 상승한 종목 2개를 찾았습니다.");
        assert_eq!(judgment.date, day(2024, 1, 17));

        let values: Vec<_> = judgment.alternatives.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(values, ["recent_rise:5:10", "recent_rise:10:20", "recent_rise:20:30"]);
    }

    #[tokio::test]
    async fn test_peak_drop_sorted_steepest_first() {
        let peaked = |high: f64, now: f64| {
            let mut closes = ramp(100.0, 180.0, 14);
            closes.extend([high, now]);
            closes
        };
        let mut pool = DataPool::new();
        pool.insert_closes("005930.KS", peaked(200.0, 150.0))
            .insert_closes("000660.KS", peaked(200.0, 80.0))
            .insert_closes("035420.KS", peaked(200.0, 190.0))
            .insert_closes("035720.KS", vec![100.0, 50.0]);

        let mut intent = trend_intent(TrendScreen::peak_drop());
        intent.limit = Some(1);
        let outcome = screener(pool).handle(&intent).await;
        let Some(Judgment::Trend(judgment)) = outcome.judgment() else {
            panic!("expected trend judgment, got {outcome:?}");
        };

        assert_eq!(judgment.total_found, 2);
        assert_eq!(judgment.matches.len(), 1);
        assert_eq!(judgment.matches[0].name, "SK하이닉스");
        assert!((judgment.matches[0].change_percent + 60.0).abs() < f64::EPSILON);
        assert!((judgment.matches[0].reference_price - 200.0).abs() < f64::EPSILON);
        assert_eq!(judgment.summary, "52주 고점 대비 20% 이상 하락한 종목 2개를 찾았습니다.");
        // The default screen is itself a preset and is not offered again
        assert_eq!(judgment.alternatives.len(), 2);
    }

    #[tokio::test]
    async fn test_no_matches_still_judged() {
        let outcome = screener(DataPool::new())
            .handle(&trend_intent(TrendScreen::RecentRise {
                days: 5,
                threshold: 10.0,
            }))
            .await;
        let Some(Judgment::Trend(judgment)) = outcome.judgment() else {
            panic!("expected trend judgment, got {outcome:?}");
        };
        assert!(judgment.matches.is_empty());
        assert_eq!(judgment.summary, "최근 5일간 10% 이상 상승한 종목은 없습니다.");
    }

    #[tokio::test]
    async fn test_judgment_serialization() {
        let outcome = screener(DataPool::new())
            .handle(&trend_intent(TrendScreen::peak_drop()))
            .await;
        let value = serde_json::to_value(outcome.judgment().unwrap()).unwrap();
        assert_eq!(value["judgment_type"], "trend");
        assert_eq!(value["kind"], "peak_drop");
        assert_eq!(value["days"], json!(252));
        assert_eq!(value["threshold"], json!(-20.0));
    }

    #[test]
    fn test_applicability() {
        let screener = screener(DataPool::new());
        assert!(screener.applies(&trend_intent(TrendScreen::recent_rise())));
        assert!(!screener.applies(&Intent::new(TaskType::Screening)));

        let mut mixed = trend_intent(TrendScreen::recent_rise());
        mixed.condition.analytics = Some(crate::intent::AnalyticsKind::Momentum);
        assert!(!screener.applies(&mixed));
    }
}
