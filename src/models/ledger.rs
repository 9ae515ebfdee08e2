// src/models/ledger.rs

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tabled::{Table, Tabled};
use thiserror::Error;

use crate::config::constants::FORWARD_HORIZONS;

pub type HorizonReturns = [Option<f64>; FORWARD_HORIZONS.len()];

/// Realised outcome of one backtest match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub symbol: String,
    pub offset: usize,
    pub as_of_ms: i64,
    pub entry_close: f64,
    /// % return at each entry of `FORWARD_HORIZONS`; `None` when not yet observable
    pub returns: HorizonReturns,
    pub sell_signal: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("offset {offset} for {symbol} is outside the backtest window of {window}")]
    OffsetOutsideWindow {
        symbol: String,
        offset: usize,
        window: usize,
    },
}

/// Per (item, offset) forward returns accumulated during a backtest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeLedger {
    window: usize,
    rows: HashMap<(String, usize), LedgerRow>,
}

#[derive(Debug, Clone, PartialEq, Tabled)]
pub struct HorizonSummary {
    #[tabled(rename = "Horizon")]
    pub horizon: usize,
    #[tabled(rename = "Samples")]
    pub samples: usize,
    #[tabled(rename = "Success")]
    pub successes: usize,
    #[tabled(rename = "Success %", display_with = "fmt_pct")]
    pub success_pct: f64,
    #[tabled(rename = "Avg Ret %", display_with = "fmt_pct")]
    pub mean_return_pct: f64,
}

fn fmt_pct(v: &f64) -> String {
    format!("{:.2}", v)
}

impl OutcomeLedger {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            rows: HashMap::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Insert or update a row. Returns true if it was a new entry.
    pub fn upsert(&mut self, row: LedgerRow) -> Result<bool, LedgerError> {
        if row.offset >= self.window {
            return Err(LedgerError::OffsetOutsideWindow {
                symbol: row.symbol,
                offset: row.offset,
                window: self.window,
            });
        }
        let key = (row.symbol.clone(), row.offset);
        Ok(self.rows.insert(key, row).is_none())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows_for(&self, symbol: &str) -> usize {
        self.rows.keys().filter(|(s, _)| s == symbol).count()
    }

    /// Rows ordered by symbol, then offset
    pub fn rows(&self) -> Vec<&LedgerRow> {
        let mut rows: Vec<&LedgerRow> = self.rows.values().collect();
        rows.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.offset.cmp(&b.offset)));
        rows
    }

    /// Hit rate and mean return per horizon. Sell signals succeed on a negative return.
    pub fn summary(&self) -> Vec<HorizonSummary> {
        let rows: Vec<&LedgerRow> = self.rows.values().collect();

        FORWARD_HORIZONS
            .par_iter()
            .enumerate()
            .map(|(i, &horizon)| {
                let (samples, successes, total) = rows
                    .iter()
                    .filter_map(|row| row.returns[i].map(|r| (r, row.sell_signal)))
                    .fold((0usize, 0usize, 0.0f64), |(n, ok, sum), (ret, sell)| {
                        let success = if sell { ret < 0.0 } else { ret > 0.0 };
                        (n + 1, ok + success as usize, sum + ret)
                    });
                let (success_pct, mean_return_pct) = if samples > 0 {
                    (
                        successes as f64 / samples as f64 * 100.0,
                        total / samples as f64,
                    )
                } else {
                    (0.0, 0.0)
                };
                HorizonSummary {
                    horizon,
                    samples,
                    successes,
                    success_pct,
                    mean_return_pct,
                }
            })
            .collect()
    }

    pub fn render_summary(&self) -> String {
        Table::new(self.summary()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(symbol: &str, offset: usize, first: Option<f64>, sell: bool) -> LedgerRow {
        let mut returns: HorizonReturns = [None; FORWARD_HORIZONS.len()];
        returns[0] = first;
        LedgerRow {
            symbol: symbol.to_string(),
            offset,
            as_of_ms: 0,
            entry_close: 100.0,
            returns,
            sell_signal: sell,
        }
    }

    #[test]
    fn offsets_outside_window_are_refused() {
        let mut ledger = OutcomeLedger::new(3);
        assert_eq!(ledger.upsert(row("A", 2, None, false)), Ok(true));
        assert!(ledger.upsert(row("A", 3, None, false)).is_err());
        assert_eq!(ledger.rows_for("A"), 1);
    }

    #[test]
    fn upsert_replaces_same_key() {
        let mut ledger = OutcomeLedger::new(5);
        assert_eq!(ledger.upsert(row("A", 1, Some(1.0), false)), Ok(true));
        assert_eq!(ledger.upsert(row("A", 1, Some(2.0), false)), Ok(false));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.rows()[0].returns[0], Some(2.0));
    }

    #[test]
    fn summary_respects_signal_direction() {
        let mut ledger = OutcomeLedger::new(5);
        ledger.upsert(row("A", 1, Some(2.0), false)).unwrap();
        ledger.upsert(row("B", 1, Some(-1.0), false)).unwrap();
        ledger.upsert(row("C", 1, Some(-3.0), true)).unwrap();
        ledger.upsert(row("D", 0, None, false)).unwrap();

        let summary = ledger.summary();
        assert_eq!(summary.len(), FORWARD_HORIZONS.len());
        let first = &summary[0];
        assert_eq!(first.horizon, 1);
        assert_eq!(first.samples, 3);
        assert_eq!(first.successes, 2);
        assert!((first.mean_return_pct - (-2.0 / 3.0)).abs() < 1e-9);
        assert_eq!(summary[1].samples, 0);
        assert!(ledger.render_summary().contains("Horizon"));
    }
}
