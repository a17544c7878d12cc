//! Cross-sectional statistics over the analytics universe

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::{HandlerOutcome, Judgment, Services, TaskHandler, round_to};
use crate::data::fetch_bulk_closing_prices;
use crate::intent::{AnalyticsKind, Intent};

const TRADING_DAYS: f64 = 252.0;
const HIGH_CORRELATION: f64 = 0.7;
const HIGH_VOLATILITY: f64 = 30.0;
const LOW_VOLATILITY: f64 = 15.0;
const STRONG_MOMENTUM: f64 = 10.0;
const WEAK_MOMENTUM: f64 = -5.0;
const MOMENTUM_WINDOWS: [(usize, f64); 3] = [(5, 0.5), (10, 0.3), (20, 0.2)];
const PORTFOLIO_SIZE: usize = 5;

const NOT_ENOUGH_SERIES: &str = "분석 가능한 데이터 부족";

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CorrelatedPair {
    pub symbol1: String,
    pub symbol2: String,
    pub correlation: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SymbolVolatility {
    pub symbol: String,
    pub name: String,
    pub volatility: f64,
}

/// Percentage changes keyed by lookback, serialized as `{"5일": ..}`
#[derive(Debug, Clone, PartialEq)]
pub struct MomentumScores(pub Vec<(usize, f64)>);

impl Serialize for MomentumScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (days, score) in &self.0 {
            map.serialize_entry(&format!("{days}일"), score)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MomentumEntry {
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub momentum_scores: MomentumScores,
    pub weighted_momentum: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PortfolioEntry {
    pub symbol: String,
    pub name: String,
    #[serde(rename = "return")]
    pub annual_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "analysis", rename_all = "snake_case")]
pub enum AnalyticsReport {
    Correlation {
        correlation_matrix: BTreeMap<String, BTreeMap<String, f64>>,
        high_correlation_pairs: Vec<CorrelatedPair>,
        total_pairs: usize,
    },
    Volatility {
        volatility_ranking: Vec<SymbolVolatility>,
        high_volatility: Vec<SymbolVolatility>,
        low_volatility: Vec<SymbolVolatility>,
    },
    Momentum {
        momentum_ranking: Vec<MomentumEntry>,
        strong_momentum: Vec<MomentumEntry>,
        weak_momentum: Vec<MomentumEntry>,
    },
    Portfolio {
        optimal_portfolio: Vec<PortfolioEntry>,
        total_analyzed: usize,
        recommendation: String,
    },
}

impl AnalyticsReport {
    pub fn kind(&self) -> AnalyticsKind {
        match self {
            Self::Correlation { .. } => AnalyticsKind::Correlation,
            Self::Volatility { .. } => AnalyticsKind::Volatility,
            Self::Momentum { .. } => AnalyticsKind::Momentum,
            Self::Portfolio { .. } => AnalyticsKind::Portfolio,
        }
    }
}

/// Close history of one universe member, oldest first
struct Series {
    symbol: String,
    name: String,
    closes: Vec<f64>,
}

impl Series {
    fn returns(&self) -> Vec<f64> {
        daily_returns(&self.closes)
    }
}

fn daily_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; zero below two observations
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Pearson correlation of two equally long samples; zero when either is flat
fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let (ma, mb) = (mean(a), mean(b));
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    if va == 0.0 || vb == 0.0 {
        return 0.0;
    }
    cov / (va.sqrt() * vb.sqrt())
}

fn annualized_volatility(returns: &[f64]) -> f64 {
    sample_std(returns) * TRADING_DAYS.sqrt() * 100.0
}

fn correlation(series: &[Series]) -> HandlerOutcome {
    let returns: Vec<(&str, Vec<f64>)> = series
        .iter()
        .filter(|s| s.closes.len() > 10)
        .map(|s| (s.symbol.as_str(), s.returns()))
        .collect();
    if returns.len() < 2 {
        return HandlerOutcome::no_judgment(NOT_ENOUGH_SERIES);
    }

    let shortest = returns.iter().map(|(_, r)| r.len()).min().unwrap_or(0);
    if shortest < 2 {
        return HandlerOutcome::no_judgment(NOT_ENOUGH_SERIES);
    }
    let aligned: Vec<(&str, &[f64])> = returns
        .iter()
        .map(|(symbol, r)| (*symbol, &r[r.len() - shortest..]))
        .collect();

    let mut matrix: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    let mut pairs = Vec::new();
    for (i, (left, a)) in aligned.iter().enumerate() {
        for (j, (right, b)) in aligned.iter().enumerate() {
            let r = if i == j { 1.0 } else { round_to(pearson(a, b), 3) };
            matrix
                .entry((*left).to_string())
                .or_default()
                .insert((*right).to_string(), r);
            if j > i && r.abs() >= HIGH_CORRELATION {
                pairs.push(CorrelatedPair {
                    symbol1: (*left).to_string(),
                    symbol2: (*right).to_string(),
                    correlation: r,
                });
            }
        }
    }

    HandlerOutcome::judged(Judgment::Analytics(AnalyticsReport::Correlation {
        correlation_matrix: matrix,
        total_pairs: pairs.len(),
        high_correlation_pairs: pairs,
    }))
}

fn volatility(series: &[Series]) -> HandlerOutcome {
    let mut ranking: Vec<SymbolVolatility> = series
        .iter()
        .filter(|s| s.closes.len() > 1)
        .map(|s| SymbolVolatility {
            symbol: s.symbol.clone(),
            name: s.name.clone(),
            volatility: round_to(annualized_volatility(&s.returns()), 2),
        })
        .collect();
    ranking.sort_by(|a, b| b.volatility.total_cmp(&a.volatility));

    let pick = |keep: fn(f64) -> bool| -> Vec<SymbolVolatility> {
        ranking.iter().filter(|v| keep(v.volatility)).cloned().collect()
    };
    let high_volatility = pick(|v| v > HIGH_VOLATILITY);
    let low_volatility = pick(|v| v < LOW_VOLATILITY);

    HandlerOutcome::judged(Judgment::Analytics(AnalyticsReport::Volatility {
        volatility_ranking: ranking,
        high_volatility,
        low_volatility,
    }))
}

fn momentum_entry(series: &Series) -> Option<MomentumEntry> {
    let closes = &series.closes;
    let longest = MOMENTUM_WINDOWS.iter().map(|(days, _)| *days).max()?;
    if closes.len() <= longest {
        return None;
    }
    let current = *closes.last()?;

    let mut scores = Vec::with_capacity(MOMENTUM_WINDOWS.len());
    let mut weighted = 0.0;
    for (days, weight) in MOMENTUM_WINDOWS {
        let past = closes[closes.len() - days];
        if past == 0.0 {
            continue;
        }
        let score = round_to((current - past) / past * 100.0, 2);
        weighted += score * weight;
        scores.push((days, score));
    }

    Some(MomentumEntry {
        symbol: series.symbol.clone(),
        name: series.name.clone(),
        current_price: current,
        momentum_scores: MomentumScores(scores),
        weighted_momentum: round_to(weighted, 2),
    })
}

fn momentum(series: &[Series]) -> HandlerOutcome {
    let mut ranking: Vec<MomentumEntry> = series.iter().filter_map(momentum_entry).collect();
    ranking.sort_by(|a, b| b.weighted_momentum.total_cmp(&a.weighted_momentum));

    let strong_momentum = ranking
        .iter()
        .filter(|m| m.weighted_momentum > STRONG_MOMENTUM)
        .cloned()
        .collect();
    let weak_momentum = ranking
        .iter()
        .filter(|m| m.weighted_momentum < WEAK_MOMENTUM)
        .cloned()
        .collect();

    HandlerOutcome::judged(Judgment::Analytics(AnalyticsReport::Momentum {
        momentum_ranking: ranking,
        strong_momentum,
        weak_momentum,
    }))
}

fn portfolio(series: &[Series]) -> HandlerOutcome {
    let mut analyzed: Vec<PortfolioEntry> = series
        .iter()
        .filter(|s| s.closes.len() > 60)
        .map(|s| {
            let returns = s.returns();
            let annual_return = mean(&returns) * TRADING_DAYS * 100.0;
            let volatility = annualized_volatility(&returns);
            let sharpe_ratio = if volatility > 0.0 {
                round_to(annual_return / volatility, 3)
            } else {
                0.0
            };
            PortfolioEntry {
                symbol: s.symbol.clone(),
                name: s.name.clone(),
                annual_return: round_to(annual_return, 2),
                volatility: round_to(volatility, 2),
                sharpe_ratio,
            }
        })
        .collect();
    analyzed.sort_by(|a, b| b.sharpe_ratio.total_cmp(&a.sharpe_ratio));

    let total_analyzed = analyzed.len();
    analyzed.truncate(PORTFOLIO_SIZE);

    HandlerOutcome::judged(Judgment::Analytics(AnalyticsReport::Portfolio {
        recommendation: format!("샤프 비율 기준 상위 {}개 종목 추천", analyzed.len()),
        optimal_portfolio: analyzed,
        total_analyzed,
    }))
}

/// Correlation, volatility, momentum and Sharpe ranking over large caps
pub struct AdvancedAnalytics {
    services: Services,
}

impl AdvancedAnalytics {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn load(&self, days: usize) -> Vec<Series> {
        let end = self.services.today.date();
        let candidates: Vec<_> = self
            .services
            .config
            .analytics_universe
            .iter()
            .map(|code| self.services.symbols.describe(code))
            .collect();

        let codes: Vec<String> = candidates.iter().map(|e| e.provider_code.clone()).collect();
        let mut closes = fetch_bulk_closing_prices(
            &self.services.data,
            &codes,
            end,
            days,
            self.services.config.max_concurrency,
        )
        .await;

        let mut series: Vec<Series> = candidates
            .into_iter()
            .filter_map(|entry| {
                let closes = closes.remove(&entry.provider_code)?;
                Some(Series {
                    symbol: entry.provider_code,
                    name: entry.name,
                    closes,
                })
            })
            .collect();

        series.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        series
    }
}

#[async_trait]
impl TaskHandler for AdvancedAnalytics {
    fn name(&self) -> &'static str {
        "advanced_analytics"
    }

    fn applies(&self, intent: &Intent) -> bool {
        intent.condition.analytics.is_some()
    }

    async fn handle(&self, intent: &Intent) -> HandlerOutcome {
        let Some(kind) = intent.condition.analytics else {
            return HandlerOutcome::skipped("no analytics kind");
        };

        let days = match kind {
            AnalyticsKind::Correlation | AnalyticsKind::Volatility => 60,
            AnalyticsKind::Momentum => MOMENTUM_WINDOWS.iter().map(|(d, _)| d).max().copied().unwrap_or(20) + 30,
            AnalyticsKind::Portfolio => 252,
        };
        let series = self.load(days).await;
        tracing::info!(analysis = kind.as_str(), series = series.len(), days, "running analytics");

        match kind {
            AnalyticsKind::Correlation => correlation(&series),
            AnalyticsKind::Volatility => volatility(&series),
            AnalyticsKind::Momentum => momentum(&series),
            AnalyticsKind::Portfolio => portfolio(&series),
        }
    }
}
