//! `market-query`: ask the market pipeline from the command line
//!
//! ```bash
//! market-query --query "어제 삼성전자 주가"
//! market-query --batch queries.json --json
//! market-query            # interactive
//! ```

mod repl;
mod session;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_market::{CachedDataAccess, MarketConfig, Orchestrator, Response, YahooDataAccess};
use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tracing::info;

use crate::session::{Session, TimedResponse};

#[derive(Parser, Debug)]
#[command(name = "market-query")]
#[command(about = "Answer natural-language questions about Korean equities", long_about = None)]
struct Args {
    /// Single query to answer
    #[arg(short, long, conflicts_with = "batch")]
    query: Option<String>,

    /// JSON file with a list of queries (strings or {"query": ..} objects)
    #[arg(short, long)]
    batch: Option<PathBuf>,

    /// Symbol table CSV (회사명,종목코드,시장구분)
    #[arg(short, long)]
    symbols: Option<PathBuf>,

    /// Print the full response envelope as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging and per-stage output
    #[arg(short, long)]
    debug: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchEntry {
    Text(String),
    Object { query: String },
}

impl BatchEntry {
    fn into_query(self) -> String {
        match self {
            Self::Text(query) | Self::Object { query } => query,
        }
    }
}

fn load_batch(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading batch file {}", path.display()))?;
    let entries: Vec<BatchEntry> = serde_json::from_str(&text)
        .with_context(|| format!("parsing batch file {}", path.display()))?;
    Ok(entries.into_iter().map(BatchEntry::into_query).collect())
}

/// Render one timed response for the terminal
fn render(timed: &TimedResponse, json: bool, debug: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(timed)?);
    }

    let response = &timed.response;
    let mut text = response.text().to_string();
    if let Response::Clarification { options, .. } = response {
        for (index, option) in options.iter().enumerate() {
            text.push_str(&format!("\n{}. {} ({})", index + 1, option.label, option.value));
        }
    }
    if debug {
        if let Response::Answer { intermediate, .. } = response {
            text.push_str("\n\n[stages]");
            for (stage, output) in intermediate.iter() {
                text.push_str(&format!("\n{stage}: {}", serde_json::to_string(output)?));
            }
        }
    }
    text.push_str(&format!("\n처리 시간: {:.2}초", timed.processing_time));
    Ok(text)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = if args.debug { "debug" } else { "warn,agent_market=info" };
    let log_config = agent_utils::Config::new("market-query")
        .with_log_filter(log_filter)
        .with_env();
    agent_utils::init_tracing_with(&log_config);

    let mut config = MarketConfig::default().with_env()?;
    if let Some(path) = &args.symbols {
        config.symbol_table_path = Some(path.clone());
    }

    let data = CachedDataAccess::new(YahooDataAccess::new(), Arc::new(config.clone()));
    let orchestrator = Orchestrator::builder(config)
        .data(Arc::new(data))
        .build()
        .context("building the query pipeline")?;

    info!(stages = ?orchestrator.stages(), "market-query ready");

    let mut session = Session::new();

    if let Some(query) = args.query {
        let timed = session.ask(&orchestrator, &query).await;
        println!("{}", render(&timed, args.json, args.debug)?);
        if timed.response.is_failure() {
            std::process::exit(1);
        }
        return Ok(());
    }

    if let Some(path) = args.batch {
        for query in load_batch(&path)? {
            let timed = session.ask(&orchestrator, &query).await;
            if args.json {
                println!("{}", serde_json::to_string(&timed)?);
            } else {
                println!("Q: {query}\n{}\n", render(&timed, false, args.debug)?);
            }
        }
        if !args.json {
            println!("{}", session.stats().render());
        }
        return Ok(());
    }

    repl::run(&orchestrator, &mut session, args.json, args.debug).await
}
