//! Configuration for market query operations

use crate::error::{MarketError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Large caps scanned by the screener and the breakout detector
const SCREENING_UNIVERSE: [&str; 20] = [
    "005930", "000660", "035420", "051910", "006400", "035720", "207940", "068270", "323410",
    "051900", "017670", "015760", "028260", "032830", "086790", "055550", "105560", "139480",
    "024110", "006380",
];

/// Upper bound on attempts per provider call
const MAX_RETRIES_CAP: u32 = 10;

/// Large caps used for correlation, volatility, momentum and portfolio ranking
const ANALYTICS_UNIVERSE: [&str; 10] = [
    "005930", "000660", "035420", "051910", "006400", "035720", "207940", "068270", "323410",
    "051900",
];

/// Configuration for the market query pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Upper bound on concurrent fetches inside one handler
    pub max_concurrency: usize,

    /// Timeout for one data-provider call
    pub request_timeout: Duration,

    /// Maximum number of attempts for a data-provider call
    pub max_retries: u32,

    /// Initial backoff duration for retries
    pub retry_backoff_base: Duration,

    /// Wall-clock limit for one pipeline run
    pub pipeline_deadline: Duration,

    /// TTL for cached data points
    pub cache_ttl: Duration,

    /// Provider calls allowed per minute
    pub rate_limit_per_minute: u32,

    /// Minimum similarity for a fuzzy symbol match
    pub fuzzy_cutoff: f64,

    /// Result cap when the query names none
    pub default_limit: usize,

    /// Candidate codes for screening and breakout detection
    pub screening_universe: Vec<String>,

    /// Candidate codes for advanced analytics
    pub analytics_universe: Vec<String>,

    /// RSI lookback
    pub rsi_period: usize,

    /// Moving-average lookback when the query names none
    pub default_ma_period: usize,

    /// Breakout percentage when the query names none
    pub default_breakout_threshold: f64,

    /// Symbol table CSV; the bundled table is used when unset
    pub symbol_table_path: Option<PathBuf>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            request_timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_backoff_base: Duration::from_millis(250),
            pipeline_deadline: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(600), // 10 minutes
            rate_limit_per_minute: 120,
            fuzzy_cutoff: 0.7,
            default_limit: 10,
            screening_universe: SCREENING_UNIVERSE.iter().map(ToString::to_string).collect(),
            analytics_universe: ANALYTICS_UNIVERSE.iter().map(ToString::to_string).collect(),
            rsi_period: 14,
            default_ma_period: 50,
            default_breakout_threshold: 10.0,
            symbol_table_path: None,
        }
    }
}

impl MarketConfig {
    /// Create a new configuration builder
    pub fn builder() -> MarketConfigBuilder {
        MarketConfigBuilder::default()
    }

    /// Apply `MARKET_*` environment overrides
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(value) = env_parse::<usize>("MARKET_MAX_CONCURRENCY")? {
            self.max_concurrency = value;
        }
        if let Some(secs) = env_parse::<u64>("MARKET_REQUEST_TIMEOUT_SECS")? {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("MARKET_PIPELINE_DEADLINE_SECS")? {
            self.pipeline_deadline = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("MARKET_CACHE_TTL_SECS")? {
            self.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(value) = env_parse::<u32>("MARKET_MAX_RETRIES")? {
            self.max_retries = value;
        }
        if let Some(value) = env_parse::<u32>("MARKET_RATE_LIMIT_PER_MINUTE")? {
            self.rate_limit_per_minute = value;
        }
        if let Ok(path) = std::env::var("MARKET_SYMBOL_TABLE") {
            self.symbol_table_path = Some(PathBuf::from(path));
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(MarketError::ConfigError(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.max_retries == 0 || self.max_retries > MAX_RETRIES_CAP {
            return Err(MarketError::ConfigError(format!(
                "max_retries must be within 1..={MAX_RETRIES_CAP}, got {}",
                self.max_retries
            )));
        }

        if self.rate_limit_per_minute == 0 {
            return Err(MarketError::ConfigError(
                "rate_limit_per_minute must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.fuzzy_cutoff) {
            return Err(MarketError::ConfigError(format!(
                "fuzzy_cutoff must be within [0, 1], got {}",
                self.fuzzy_cutoff
            )));
        }

        if self.default_limit == 0 {
            return Err(MarketError::ConfigError(
                "default_limit must be greater than 0".to_string(),
            ));
        }

        if self.screening_universe.is_empty() || self.analytics_universe.is_empty() {
            return Err(MarketError::ConfigError(
                "candidate universes must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Get retry backoff duration for attempt number
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.retry_backoff_base.saturating_mul(factor)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| MarketError::ConfigError(format!("{key} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}

/// Builder for MarketConfig
#[derive(Debug, Default)]
pub struct MarketConfigBuilder {
    max_concurrency: Option<usize>,
    request_timeout: Option<Duration>,
    max_retries: Option<u32>,
    retry_backoff_base: Option<Duration>,
    pipeline_deadline: Option<Duration>,
    cache_ttl: Option<Duration>,
    rate_limit_per_minute: Option<u32>,
    fuzzy_cutoff: Option<f64>,
    default_limit: Option<usize>,
    screening_universe: Option<Vec<String>>,
    analytics_universe: Option<Vec<String>>,
    symbol_table_path: Option<PathBuf>,
}

impl MarketConfigBuilder {
    /// Set the fetch concurrency bound
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = Some(duration);
        self
    }

    /// Set maximum retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set retry backoff base duration
    pub fn retry_backoff_base(mut self, duration: Duration) -> Self {
        self.retry_backoff_base = Some(duration);
        self
    }

    /// Set the overall pipeline deadline
    pub fn pipeline_deadline(mut self, duration: Duration) -> Self {
        self.pipeline_deadline = Some(duration);
        self
    }

    /// Set cache TTL
    pub fn cache_ttl(mut self, duration: Duration) -> Self {
        self.cache_ttl = Some(duration);
        self
    }

    /// Set provider calls per minute
    pub fn rate_limit_per_minute(mut self, calls: u32) -> Self {
        self.rate_limit_per_minute = Some(calls);
        self
    }

    /// Set the fuzzy match cutoff
    pub fn fuzzy_cutoff(mut self, cutoff: f64) -> Self {
        self.fuzzy_cutoff = Some(cutoff);
        self
    }

    /// Set the default result limit
    pub fn default_limit(mut self, limit: usize) -> Self {
        self.default_limit = Some(limit);
        self
    }

    /// Replace the screening universe
    pub fn screening_universe<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.screening_universe = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the analytics universe
    pub fn analytics_universe<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.analytics_universe = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    /// Load the symbol table from a CSV file
    pub fn symbol_table_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.symbol_table_path = Some(path.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<MarketConfig> {
        let defaults = MarketConfig::default();

        let config = MarketConfig {
            max_concurrency: self.max_concurrency.unwrap_or(defaults.max_concurrency),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_backoff_base: self.retry_backoff_base.unwrap_or(defaults.retry_backoff_base),
            pipeline_deadline: self.pipeline_deadline.unwrap_or(defaults.pipeline_deadline),
            cache_ttl: self.cache_ttl.unwrap_or(defaults.cache_ttl),
            rate_limit_per_minute: self
                .rate_limit_per_minute
                .unwrap_or(defaults.rate_limit_per_minute),
            fuzzy_cutoff: self.fuzzy_cutoff.unwrap_or(defaults.fuzzy_cutoff),
            default_limit: self.default_limit.unwrap_or(defaults.default_limit),
            screening_universe: self
                .screening_universe
                .unwrap_or(defaults.screening_universe),
            analytics_universe: self
                .analytics_universe
                .unwrap_or(defaults.analytics_universe),
            rsi_period: defaults.rsi_period,
            default_ma_period: defaults.default_ma_period,
            default_breakout_threshold: defaults.default_breakout_threshold,
            symbol_table_path: self.symbol_table_path,
        };

        config.validate()?;
        Ok(config)
    }
}
