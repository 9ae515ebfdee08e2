use serde::{Deserialize, Serialize};

use crate::config::constants::scan;
use crate::domain::StrategySelector;

/// Item-level thresholds supplied by the front-end alongside the strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanParams {
    /// Narrow-range window and MA-support length
    pub ma_length: usize,
    pub days_for_lowest_volume: usize,
    pub min_rsi: f64,
    pub max_rsi: f64,
    pub min_cci: f64,
    pub max_cci: f64,
    pub inside_bar_lookback: usize,
    /// Maximum spread (%) between the short and long averages for confluence
    pub confluence_pct: f64,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            ma_length: scan::MA_LENGTH,
            days_for_lowest_volume: scan::DAYS_FOR_LOWEST_VOLUME,
            min_rsi: scan::MIN_RSI,
            max_rsi: scan::MAX_RSI,
            min_cci: scan::MIN_CCI,
            max_cci: scan::MAX_CCI,
            inside_bar_lookback: scan::INSIDE_BAR_LOOKBACK,
            confluence_pct: scan::CONFLUENCE_PCT,
        }
    }
}

/// One evaluation unit. Built by the dispatcher and never modified once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub symbol: String,
    pub selector: StrategySelector,
    pub params: ScanParams,
    /// Volume surge threshold for this item; `<= 0` falls back to the configured ratio
    pub volume_ratio: f64,
    /// Size of the universe this item belongs to (handed to the fetch collaborator)
    pub total_symbols: usize,
    pub cache_allowed: bool,
    pub download_only: bool,
    pub newly_listed_only: bool,
    /// 0 = as of today, k > 0 = k periods back
    pub offset: usize,
    /// Backtest forward window (0 outside backtests)
    pub forward_window: usize,
    pub verbose: bool,
}

impl WorkItem {
    pub fn effective_volume_ratio(&self, configured: f64) -> f64 {
        if self.volume_ratio <= 0.0 {
            configured
        } else {
            self.volume_ratio
        }
    }
}
