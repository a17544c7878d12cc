//! Moving-average breakout detection

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use super::{HandlerOutcome, Judgment, Services, TaskHandler, round_to};
use crate::data::fetch_bulk_moving_average;
use crate::intent::{Intent, trading_day_adjust};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakoutStock {
    pub name: String,
    pub code: String,
    pub current_price: f64,
    pub moving_average: f64,
    pub breakout_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalJudgment {
    pub date: NaiveDate,
    pub period: usize,
    pub threshold: f64,
    pub matches: Vec<BreakoutStock>,
    pub summary: String,
}

/// Ranks universe symbols trading above their moving average
pub struct SignalDetector {
    services: Services,
}

impl SignalDetector {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl TaskHandler for SignalDetector {
    fn name(&self) -> &'static str {
        "signal_detector"
    }

    fn applies(&self, intent: &Intent) -> bool {
        intent.condition.breakout.is_some()
    }

    async fn handle(&self, intent: &Intent) -> HandlerOutcome {
        let Some(breakout) = intent.condition.breakout else {
            return HandlerOutcome::skipped("no breakout condition");
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

        tracing::info!(
            candidates = candidates.len(),
            period = breakout.period,
            threshold = breakout.threshold,
            %date,
            "detecting breakouts"
        );

        let codes: Vec<String> = candidates.iter().map(|e| e.provider_code.clone()).collect();
        let snapshots = fetch_bulk_moving_average(
            &self.services.data,
            &codes,
            date,
            breakout.period,
            self.services.config.max_concurrency,
        )
        .await;

        let mut matches: Vec<BreakoutStock> = candidates
            .into_iter()
            .filter_map(|entry| {
                let snapshot = snapshots.get(&entry.provider_code)?;
                (snapshot.is_breakout && snapshot.breakout_ratio >= breakout.threshold).then(|| {
                    BreakoutStock {
                        name: entry.name,
                        code: entry.exchange_code,
                        current_price: snapshot.current_price,
                        moving_average: round_to(snapshot.moving_average, 2),
                        breakout_ratio: round_to(snapshot.breakout_ratio, 2),
                    }
                })
            })
            .collect();

        matches.sort_by(|a, b| b.breakout_ratio.total_cmp(&a.breakout_ratio));
        matches.truncate(limit);

        let lead = format!(
            "{date} 기준 {}일 이동평균선을 {}% 이상 상향 돌파한 종목",
            breakout.period, breakout.threshold
        );
        let summary = if matches.is_empty() {
            format!("{lead}은 없습니다.")
        } else {
            format!("{lead} {}개를 찾았습니다.", matches.len())
        };

        HandlerOutcome::judged(Judgment::Signal(SignalJudgment {
            date,
            period: breakout.period,
            threshold: breakout.threshold,
            matches,
            summary,
        }))
    }
}
