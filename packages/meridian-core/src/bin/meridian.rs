//! Meridian CLI - Replay fixture tables through the metrics engine.
//!
//! Output is JSON on stdout; logs go to stderr.

use clap::{Parser, Subcommand};
use meridian_core::{
    compare, read_fixture, ApiResponse, DataQualityWarning, Engine, EngineConfig, PortfolioTick,
    SnapshotMerger,
};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "meridian")]
#[command(about = "Meridian CLI - portfolio performance and risk metrics")]
#[command(version)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a fixture table and report the metric series
    Replay {
        /// Fixture CSV with timestamp, <SYM>_position and <SYM>_price columns
        #[arg(short, long)]
        fixture: PathBuf,
        /// Write the full metric series to this CSV file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Replay a benchmark and a portfolio side by side
    Compare {
        /// Benchmark fixture CSV
        #[arg(short, long)]
        benchmark: PathBuf,
        /// Portfolio fixture CSV
        #[arg(short, long)]
        portfolio: PathBuf,
    },
    /// Print the effective engine configuration
    Config,
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(EngineConfig::default_path);
    let output = match EngineConfig::load_from_path(&config_path) {
        Ok(config) => match cli.command {
            Commands::Replay { fixture, out } => handle_replay(config, &fixture, out.as_deref()),
            Commands::Compare {
                benchmark,
                portfolio,
            } => handle_compare(config, &benchmark, &portfolio),
            Commands::Config => render(&ApiResponse::ok(config)),
        },
        Err(e) => render(&ApiResponse::<()>::err(e.to_string())),
    };

    println!("{}", output);
}

fn render<T: Serialize>(response: &ApiResponse<T>) -> String {
    serde_json::to_string_pretty(response)
        .unwrap_or_else(|e| format!(r#"{{"ok":false,"error":"{}"}}"#, e))
}

/// Merge a fixture into ticks, returning the merger's data-quality warnings.
fn load_ticks(path: &Path) -> meridian_core::Result<(Vec<PortfolioTick>, Vec<DataQualityWarning>)> {
    let (positions, quotes) = read_fixture(path)?;
    let mut merger = SnapshotMerger::new(positions, quotes);
    let ticks = merger.by_ref().collect::<meridian_core::Result<Vec<_>>>()?;
    Ok((ticks, merger.take_warnings()))
}

fn handle_replay(config: EngineConfig, fixture: &Path, out: Option<&Path>) -> String {
    let run = || -> meridian_core::Result<serde_json::Value> {
        let (ticks, mut warnings) = load_ticks(fixture)?;
        let mut engine = Engine::new(config)?;
        let samples = engine.process_batch(&ticks)?;
        warnings.extend(engine.take_warnings());

        if let Some(path) = out {
            meridian_core::feed::write_metrics_csv_to_path(path, &samples)?;
            tracing::info!(path = %path.display(), rows = samples.len(), "metric series written");
        }

        Ok(json!({
            "ticks": samples.len(),
            "last": samples.last(),
            "invested_capital": engine.state().cost_basis().invested_capital_total(),
            "warnings": warnings,
        }))
    };

    match run() {
        Ok(data) => render(&ApiResponse::ok(data)),
        Err(e) => render(&ApiResponse::<()>::err(e.to_string())),
    }
}

fn handle_compare(config: EngineConfig, benchmark: &Path, portfolio: &Path) -> String {
    let run = || -> meridian_core::Result<serde_json::Value> {
        let (benchmark_ticks, mut benchmark_warnings) = load_ticks(benchmark)?;
        let (portfolio_ticks, mut portfolio_warnings) = load_ticks(portfolio)?;
        let comparison = compare(&config, &benchmark_ticks, &config, &portfolio_ticks)?;
        benchmark_warnings.extend(comparison.benchmark_warnings.iter().cloned());
        portfolio_warnings.extend(comparison.portfolio_warnings.iter().cloned());

        Ok(json!({
            "benchmark": comparison.benchmark.last(),
            "portfolio": comparison.portfolio.last(),
            "excess_pnl": comparison.excess_pnl(),
            "warnings": {
                "benchmark": benchmark_warnings,
                "portfolio": portfolio_warnings,
            },
        }))
    };

    match run() {
        Ok(data) => render(&ApiResponse::ok(data)),
        Err(e) => render(&ApiResponse::<()>::err(e.to_string())),
    }
}
