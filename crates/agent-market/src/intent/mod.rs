//! Structured interpretation of a free-text query

pub mod dates;
pub mod understander;

pub use dates::{DateSpec, Today, extract_date, previous_trading_day, trading_day_adjust};
pub use understander::QueryUnderstander;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::symbols::SymbolRef;

/// What the query asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// One named symbol, one metric
    SimpleInquiry,
    /// Entity-agnostic filter over a universe
    Screening,
}

/// Inclusive pair of trading days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeDirection {
    Up,
    Down,
}

/// Price crossing above its moving average
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakoutCondition {
    /// Moving-average lookback in trading days
    pub period: usize,
    /// Minimum percentage above the average
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsKind {
    Correlation,
    Volatility,
    Momentum,
    Portfolio,
}

impl AnalyticsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Correlation => "correlation",
            Self::Volatility => "volatility",
            Self::Momentum => "momentum",
            Self::Portfolio => "portfolio",
        }
    }
}

/// Price-trend screen behind the clarification menu
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrendScreen {
    /// Close-to-close gain over the last `days` sessions of at least `threshold` percent
    RecentRise { days: usize, threshold: f64 },
    /// Distance below the `days`-session high of at most `threshold` percent (negative)
    PeakDrop { days: usize, threshold: f64 },
}

impl TrendScreen {
    pub const RECENT_RISE: &'static str = "recent_rise";
    pub const PEAK_DROP: &'static str = "peak_drop";

    pub fn recent_rise() -> Self {
        Self::RecentRise {
            days: 10,
            threshold: 10.0,
        }
    }

    pub fn peak_drop() -> Self {
        Self::PeakDrop {
            days: 252,
            threshold: -20.0,
        }
    }

    /// Parse a menu value: `recent_rise` / `peak_drop`, optionally `:days:threshold`
    pub fn from_value(value: &str) -> Option<Self> {
        let mut parts = value.trim().split(':');
        let base = match parts.next()? {
            Self::RECENT_RISE => Self::recent_rise(),
            Self::PEAK_DROP => Self::peak_drop(),
            _ => return None,
        };

        match (parts.next(), parts.next(), parts.next()) {
            (None, _, _) => Some(base),
            (Some(days), Some(threshold), None) => {
                let days = days.parse().ok().filter(|d| *d > 0)?;
                let threshold: f64 = threshold.parse().ok()?;
                Some(base.with(days, threshold))
            }
            _ => None,
        }
    }

    /// Same kind with new parameters; a drop threshold is always negative
    pub fn with(self, days: usize, threshold: f64) -> Self {
        match self {
            Self::RecentRise { .. } => Self::RecentRise { days, threshold },
            Self::PeakDrop { .. } => Self::PeakDrop {
                days,
                threshold: -threshold.abs(),
            },
        }
    }

    pub fn days(&self) -> usize {
        match self {
            Self::RecentRise { days, .. } | Self::PeakDrop { days, .. } => *days,
        }
    }

    pub fn threshold(&self) -> f64 {
        match self {
            Self::RecentRise { threshold, .. } | Self::PeakDrop { threshold, .. } => *threshold,
        }
    }

    /// Menu value that parses back through [`TrendScreen::from_value`]
    pub fn value(&self) -> String {
        match self {
            Self::RecentRise { days, threshold } => {
                format!("{}:{days}:{threshold}", Self::RECENT_RISE)
            }
            Self::PeakDrop { days, threshold } => {
                format!("{}:{days}:{}", Self::PEAK_DROP, threshold.abs())
            }
        }
    }

    /// Human-readable criterion, e.g. "최근 5일 10% 이상 상승"
    pub fn label(&self) -> String {
        match self {
            Self::RecentRise { days, threshold } => format!("최근 {days}일 {threshold}% 이상 상승"),
            Self::PeakDrop { days, threshold } => {
                format!("{} 고점 대비 {}% 이상 하락", period_label(*days), threshold.abs())
            }
        }
    }

    /// The fixed refinements offered for this kind of screen
    pub fn presets(&self) -> [Self; 3] {
        match self {
            Self::RecentRise { .. } => [(5, 10.0), (10, 20.0), (20, 30.0)].map(|(days, threshold)| {
                Self::RecentRise { days, threshold }
            }),
            Self::PeakDrop { .. } => [20.0, 30.0, 50.0].map(|drop| Self::PeakDrop {
                days: 252,
                threshold: -drop,
            }),
        }
    }
}

/// "52주" for a trading year, "N일" otherwise
pub fn period_label(days: usize) -> String {
    if days == 252 {
        "52주".to_string()
    } else {
        format!("{days}일")
    }
}

/// Conditions recognised in the query
///
/// Serialised with textual thresholds: `rsi` as `">70"`, `volume_change`
/// as `"50%"`. Absent conditions are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionSet {
    /// Lower RSI bound; the comparator is always "above"
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "threshold_text::rsi"
    )]
    pub rsi: Option<u32>,

    /// Volume change magnitude in percent
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "threshold_text::percent"
    )]
    pub volume_change: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_direction: Option<VolumeDirection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakout: Option<BreakoutCondition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics: Option<AnalyticsKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendScreen>,
}

/// The single check a one-symbol lookup performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    RsiAbove(u32),
    VolumeChange {
        direction: Option<VolumeDirection>,
        percent: u32,
    },
}

impl ConditionSet {
    /// Highest-priority single-symbol condition: RSI, then volume change
    pub fn primary(&self) -> Option<Condition> {
        if let Some(threshold) = self.rsi {
            return Some(Condition::RsiAbove(threshold));
        }
        self.volume_change.map(|percent| Condition::VolumeChange {
            direction: self.volume_direction,
            percent,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Structured result of query understanding
///
/// `symbol` is only ever set for simple inquiries, and at most one of
/// `date` / `date_range` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub task: TaskType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<SymbolRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,

    #[serde(default)]
    pub condition: ConditionSet,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Intent {
    /// Empty intent of the given task type
    pub fn new(task: TaskType) -> Self {
        Self {
            task,
            symbol: None,
            date: None,
            date_range: None,
            condition: ConditionSet::default(),
            limit: None,
        }
    }

    pub fn is_screening(&self) -> bool {
        self.task == TaskType::Screening
    }
}

/// `">70"` / `"50%"` renderings of numeric thresholds
mod threshold_text {
    use serde::{Deserialize, Deserializer, Serializer};

    fn parse<'de, D>(deserializer: D, strip: fn(&str) -> &str) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text: Option<String> = Option::deserialize(deserializer)?;
        text.map(|t| strip(t.trim()).trim().parse().map_err(serde::de::Error::custom))
            .transpose()
    }

    pub mod rsi {
        use super::{Deserializer, Serializer, parse};

        pub fn serialize<S: Serializer>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(n) => serializer.serialize_str(&format!(">{n}")),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
            parse(deserializer, |t| t.trim_start_matches('>'))
        }
    }

    pub mod percent {
        use super::{Deserializer, Serializer, parse};

        pub fn serialize<S: Serializer>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(n) => serializer.serialize_str(&format!("{n}%")),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
            parse(deserializer, |t| t.trim_end_matches('%'))
        }
    }
}
