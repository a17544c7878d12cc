//! Natural-language market query pipeline
//!
//! Turns a free-text question about Korean equities into a structured
//! [`Intent`](intent::Intent), routes it through task handlers that query a
//! [`DataAccess`](data::DataAccess) capability, and renders the judgment as
//! a response.
//!
//! # Architecture
//!
//! The [`Orchestrator`] runs eight stages over one
//! [`QueryContext`](context::QueryContext), strictly in order:
//! - `query_understander`: task type, dates, conditions, limit and symbol
//! - `ambiguity_checker`: may halt the run with a clarification request
//! - `analyzer`, `screener`, `signal_detector`, `advanced_analytics`,
//!   `trend_screener`: at most one of them applies to a given intent
//! - `summarizer`: deterministic templates, optionally an external
//!   [`Narrator`](summarizer::Narrator) for analytics
//!
//! # Example
//!
//! ```rust,ignore
//! use agent_market::{CachedDataAccess, MarketConfig, Orchestrator, YahooDataAccess};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MarketConfig::default().with_env()?;
//!     let data = CachedDataAccess::new(YahooDataAccess::new(), Arc::new(config.clone()));
//!
//!     let orchestrator = Orchestrator::builder(config)
//!         .data(Arc::new(data))
//!         .build()?;
//!
//!     let response = orchestrator.run("어제 삼성전자 주가").await;
//!     println!("{}", response.text());
//!     Ok(())
//! }
//! ```

pub mod ambiguity;
pub mod cache;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod handlers;
pub mod intent;
pub mod orchestrator;
pub mod summarizer;
pub mod symbols;

// Re-export main types for convenience
pub use config::MarketConfig;
pub use context::{QueryContext, StageOutput};
pub use data::{CachedDataAccess, DataAccess, DataPool, YahooDataAccess};
pub use error::{FetchError, MarketError, Result};
pub use intent::{Intent, Today};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, Response};
pub use summarizer::Narrator;
pub use symbols::SymbolTable;
