use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::data::FetchError;
use crate::models::OhlcvTimeSeries;

/// Human-facing row. Predicates fill their column whether or not the item matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Tabled)]
pub struct DisplayRecord {
    #[tabled(rename = "Stock")]
    pub stock: String,
    #[tabled(rename = "Consol.")]
    pub consolidating: String,
    #[tabled(rename = "Breakout")]
    pub breakout: String,
    #[tabled(rename = "MA-Signal")]
    pub ma_signal: String,
    #[tabled(rename = "Volume")]
    pub volume: String,
    #[tabled(rename = "LTP")]
    pub ltp: String,
    #[tabled(rename = "%Chng")]
    pub change_pct: String,
    #[tabled(rename = "RSI")]
    pub rsi: String,
    #[tabled(rename = "Trend")]
    pub trend: String,
    #[tabled(rename = "Pattern")]
    pub pattern: String,
    #[tabled(rename = "CCI")]
    pub cci: String,
}

/// Machine-facing twin of [`DisplayRecord`] with typed values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub stock: String,
    /// Close-price range over the lookback window, in %
    pub consolidation_pct: Option<f64>,
    /// Resistance level the breakout was measured against
    pub breakout_level: Option<f64>,
    pub ma_signal: Option<String>,
    /// Latest volume / average volume
    pub volume_ratio: Option<f64>,
    pub ltp: Option<f64>,
    pub change_pct: Option<f64>,
    pub rsi: Option<f64>,
    pub trend: Option<String>,
    pub pattern: Option<String>,
    pub cci: Option<f64>,
}

/// A strategy match, carrying everything the collector needs.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub symbol: String,
    pub offset: usize,
    pub display: DisplayRecord,
    pub raw: RawRecord,
    /// Full history, including rows after the as-of date when backtesting
    pub dataset: Arc<OhlcvTimeSeries>,
}

/// Why a consumed item produced no result. None of these are faults of the run.
#[derive(Debug, Clone, PartialEq)]
pub enum NoMatchReason {
    FetchFailed(String),
    EmptyDataset,
    InsufficientHistory { rows: usize, required: usize },
    NotNewlyListed { age: usize },
    /// Download-only run: the dataset was cached, nothing was evaluated
    DownloadOnly,
    StrategyRejected,
    /// Unexpected failure (including a caught panic) while processing the item
    Fault(String),
    Cancelled,
}

impl fmt::Display for NoMatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoMatchReason::FetchFailed(msg) => write!(f, "fetch failed: {}", msg),
            NoMatchReason::EmptyDataset => write!(f, "empty dataset"),
            NoMatchReason::InsufficientHistory { rows, required } => {
                write!(f, "insufficient history ({} rows, {} required)", rows, required)
            }
            NoMatchReason::NotNewlyListed { age } => write!(f, "not newly listed ({} rows)", age),
            NoMatchReason::DownloadOnly => write!(f, "download only"),
            NoMatchReason::StrategyRejected => write!(f, "strategy rejected"),
            NoMatchReason::Fault(msg) => write!(f, "fault: {}", msg),
            NoMatchReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl From<FetchError> for NoMatchReason {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Empty { .. } => NoMatchReason::EmptyDataset,
            other => NoMatchReason::FetchFailed(other.to_string()),
        }
    }
}

/// Exactly one of these is published per consumed work item.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Match(Box<EvaluationResult>),
    NoMatch {
        symbol: String,
        offset: usize,
        reason: NoMatchReason,
    },
}

impl ScanOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            ScanOutcome::Match(result) => &result.symbol,
            ScanOutcome::NoMatch { symbol, .. } => symbol,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, ScanOutcome::Match(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fetch_maps_to_empty_dataset() {
        let reason: NoMatchReason = FetchError::Empty {
            symbol: "X".into(),
        }
        .into();
        assert_eq!(reason, NoMatchReason::EmptyDataset);

        let reason: NoMatchReason = FetchError::Transient {
            symbol: "X".into(),
            message: "timeout".into(),
        }
        .into();
        assert!(matches!(reason, NoMatchReason::FetchFailed(m) if m.contains("timeout")));
    }
}
