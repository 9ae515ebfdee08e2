#![allow(clippy::const_is_empty)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

// Core modules
pub mod analysis;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod models;
pub mod utils;

// Re-export commonly used types outside of crate (for the binaries and integration tests)
pub use crate::models::OhlcvTimeSeries;
pub use config::{PERSISTENCE, ScreenerConfig};
pub use domain::{ChartPattern, ReversalKind, ScanMode, StrategySelector};
pub use engine::{CancellationSignal, EngineError, ScanReport, ScanRequest, ScreenerEngine};

// CLI argument parsing
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Symbols to screen
    #[arg(value_name = "SYMBOL")]
    pub symbols: Vec<String>,

    /// Newline-separated symbol list, appended to SYMBOL
    #[arg(long, value_name = "FILE")]
    pub universe_file: Option<PathBuf>,

    /// Sqlite database holding daily bars
    #[arg(long, default_value = PERSISTENCE.ledger.database_path)]
    pub db: String,

    /// JSON file with screener thresholds
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ScanMode::FullScan)]
    pub mode: ScanMode,

    /// Sub-mode, required with `--mode reversal`
    #[arg(long, value_enum)]
    pub reversal: Option<ReversalKind>,

    /// Pattern, required with `--mode chart-pattern`
    #[arg(long, value_enum)]
    pub pattern: Option<ChartPattern>,

    /// Backtest over this many historical offsets (0 = config default)
    #[arg(long, value_name = "DEPTH")]
    pub backtest: Option<usize>,

    /// Only refresh the dataset cache
    #[arg(long, default_value_t = false)]
    pub download_only: bool,

    /// Restrict to recently listed symbols
    #[arg(long, default_value_t = false)]
    pub newly_listed: bool,

    /// Ignore the dataset cache for this run
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,

    /// Dataset cache file (defaults to the configured cache directory)
    #[arg(long, value_name = "FILE")]
    pub cache_file: Option<PathBuf>,

    /// Treat the market as open (true) or closed (false) instead of reading the clock
    #[arg(long)]
    pub market_open: Option<bool>,

    #[arg(long)]
    pub min_rsi: Option<f64>,

    #[arg(long)]
    pub max_rsi: Option<f64>,

    #[arg(long)]
    pub min_cci: Option<f64>,

    #[arg(long)]
    pub max_cci: Option<f64>,

    /// Volume surge ratio (0 = config default)
    #[arg(long, default_value_t = 0.0)]
    pub volume_ratio: f64,

    /// Write backtest outcomes to the sqlite database
    #[arg(long, default_value_t = false)]
    pub commit: bool,

    /// Override the worker count
    #[arg(long)]
    pub workers: Option<usize>,

    /// Debug logging and per-item fault warnings
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    pub fn selector(&self) -> StrategySelector {
        StrategySelector {
            mode: self.mode,
            reversal: self.reversal,
            pattern: self.pattern,
        }
    }

    /// SYMBOL arguments followed by the universe file, duplicates removed in order.
    pub fn universe(&self) -> anyhow::Result<Vec<String>> {
        let mut symbols = self.symbols.clone();
        if let Some(path) = &self.universe_file {
            let text = std::fs::read_to_string(path)?;
            symbols.extend(
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_string),
            );
        }
        let mut seen = std::collections::HashSet::new();
        symbols.retain(|s| seen.insert(s.clone()));
        Ok(symbols)
    }
}
