//! Backtest folding: matched results become ledger rows, with periodic
//! interim flushes and wall-clock checkpoints.
//!
//! Each match at offset `k` is replayed against the rows that followed its
//! as-of row. Horizons that run past the end of the data stay `None`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::DF;
use crate::config::constants::FORWARD_HORIZONS;
use crate::data::{OutcomeCommitter, save_ledger};
use crate::models::{EvaluationResult, HorizonReturns, LedgerError, LedgerRow, OutcomeLedger, snapshot};
use crate::utils::pct_change;

/// Forward returns of one matched result. `None` if the offset is outside the dataset.
pub fn ledger_row(result: &EvaluationResult, forward_window: usize, sell_signal: bool) -> Option<LedgerRow> {
    let snap = snapshot(&result.dataset, result.offset, forward_window)?;
    let forward = &snap.forward;
    let entry = *forward.close_prices.first()?;

    let mut returns: HorizonReturns = [None; FORWARD_HORIZONS.len()];
    for (slot, &h) in returns.iter_mut().zip(FORWARD_HORIZONS.iter()) {
        if h < forward.klines() {
            *slot = Some(pct_change(entry, forward.close_prices[h]));
        }
    }

    Some(LedgerRow {
        symbol: result.symbol.clone(),
        offset: result.offset,
        as_of_ms: *forward.timestamps.first()?,
        entry_close: entry,
        returns,
        sell_signal,
    })
}

// ─── Sink ─────────────────────────────────────────────────────────────────────

/// Collector-side accumulator for one backtest run.
pub struct BacktestSink {
    ledger: OutcomeLedger,
    run_id: String,
    sell_signal: bool,
    committer: Option<Arc<dyn OutcomeCommitter>>,
    snapshot_path: Option<PathBuf>,
    flush_every: u64,
    checkpoint_after: Duration,
    next_checkpoint: Duration,
    folded: u64,
    commits: usize,
}

impl BacktestSink {
    pub fn new(
        run_id: &str,
        window: usize,
        sell_signal: bool,
        flush_every: u64,
        checkpoint_after: Duration,
    ) -> Self {
        Self {
            ledger: OutcomeLedger::new(window),
            run_id: run_id.to_string(),
            sell_signal,
            committer: None,
            snapshot_path: None,
            flush_every: flush_every.max(1),
            checkpoint_after,
            next_checkpoint: checkpoint_after,
            folded: 0,
            commits: 0,
        }
    }

    pub fn with_committer(mut self, committer: Option<Arc<dyn OutcomeCommitter>>) -> Self {
        self.committer = committer;
        self
    }

    pub fn with_snapshot_path(mut self, path: Option<PathBuf>) -> Self {
        self.snapshot_path = path;
        self
    }

    pub fn ledger(&self) -> &OutcomeLedger {
        &self.ledger
    }

    /// Successful commits so far
    pub fn commits(&self) -> usize {
        self.commits
    }

    /// Add one match. Offsets outside the window are refused.
    pub fn fold(&mut self, result: &EvaluationResult) -> Result<(), LedgerError> {
        let Some(row) = ledger_row(result, self.ledger.window(), self.sell_signal) else {
            log::debug!("{}@{}: no forward data", result.symbol, result.offset);
            return Ok(());
        };
        if DF.log_ledger {
            log::debug!("LEDGER: {}@{} entry {:.2}", row.symbol, row.offset, row.entry_close);
        }
        self.ledger.upsert(row)?;
        self.folded += 1;
        if self.folded % self.flush_every == 0 {
            self.interim_flush();
        }
        Ok(())
    }

    /// Log the running summary and refresh the snapshot file.
    pub fn interim_flush(&self) {
        log::info!(
            "Backtest interim ({} rows)\n{}",
            self.ledger.len(),
            self.ledger.render_summary()
        );
        if let Some(path) = &self.snapshot_path {
            if let Err(e) = save_ledger(&self.ledger, path) {
                log::warn!("Ledger snapshot failed: {:#}", e);
            }
        }
    }

    /// Commit once `elapsed` has reached the next checkpoint. Returns true if a commit ran.
    pub fn maybe_checkpoint(&mut self, elapsed: Duration) -> bool {
        if self.committer.is_none() || elapsed < self.next_checkpoint {
            return false;
        }
        self.next_checkpoint = elapsed + self.checkpoint_after;
        log::info!("Checkpoint after {:?}: committing {} rows", elapsed, self.ledger.len());
        self.commit()
    }

    /// Final commit and hand-over of the ledger.
    pub fn finish(mut self) -> OutcomeLedger {
        if self.committer.is_some() {
            self.commit();
        }
        self.interim_flush();
        self.ledger
    }

    fn commit(&mut self) -> bool {
        let Some(committer) = &self.committer else {
            return false;
        };
        match committer.commit(&self.run_id, &self.ledger) {
            Ok(()) => {
                self.commits += 1;
                true
            }
            Err(e) => {
                log::error!("Ledger commit failed: {:#}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_utils::series_from_closes;
    use crate::models::{DisplayRecord, RawRecord};
    use parking_lot::Mutex;

    fn result_at(closes: &[f64], offset: usize) -> EvaluationResult {
        EvaluationResult {
            symbol: "ACME".into(),
            offset,
            display: DisplayRecord::default(),
            raw: RawRecord::default(),
            dataset: Arc::new(series_from_closes("ACME", closes, 1000.0)),
        }
    }

    #[derive(Default)]
    struct Recorder {
        commits: Mutex<Vec<usize>>,
    }

    impl OutcomeCommitter for Recorder {
        fn commit(&self, _run_id: &str, ledger: &OutcomeLedger) -> anyhow::Result<()> {
            self.commits.lock().push(ledger.len());
            Ok(())
        }
    }

    #[test]
    fn forward_returns_stop_at_the_data_edge() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        // as-of row is index 6 (close 106); three rows follow it
        let row = ledger_row(&result_at(&closes, 3), 30, false).unwrap();
        assert_eq!(row.entry_close, 106.0);
        let r1 = row.returns[0].unwrap();
        assert!((r1 - (107.0 / 106.0 - 1.0) * 100.0).abs() < 1e-9);
        assert!(row.returns[2].is_some());
        assert!(row.returns[3].is_none());
        assert!(row.returns[8].is_none());
    }

    #[test]
    fn forward_window_limits_horizons() {
        let closes: Vec<f64> = (0..60).map(|i| 50.0 + i as f64).collect();
        let row = ledger_row(&result_at(&closes, 40), 5, false).unwrap();
        // as-of row 19 plus five forward rows
        assert!(row.returns[4].is_some());
        assert!(row.returns[5].is_none());
    }

    #[test]
    fn fold_refuses_offsets_outside_window() {
        let closes: Vec<f64> = (0..20).map(|i| 10.0 + i as f64).collect();
        let mut sink = BacktestSink::new("run", 4, false, 50, Duration::from_secs(3600));
        assert!(sink.fold(&result_at(&closes, 3)).is_ok());
        assert!(sink.fold(&result_at(&closes, 4)).is_err());
        assert_eq!(sink.ledger().len(), 1);
    }

    #[test]
    fn checkpoints_are_spaced_by_the_interval() {
        let recorder = Arc::new(Recorder::default());
        let mut sink = BacktestSink::new("run", 4, false, 50, Duration::from_secs(10))
            .with_committer(Some(recorder.clone() as Arc<dyn OutcomeCommitter>));

        assert!(!sink.maybe_checkpoint(Duration::from_secs(9)));
        assert!(sink.maybe_checkpoint(Duration::from_secs(10)));
        assert!(!sink.maybe_checkpoint(Duration::from_secs(15)));
        assert!(sink.maybe_checkpoint(Duration::from_secs(21)));
        assert_eq!(sink.commits(), 2);

        sink.finish();
        assert_eq!(recorder.commits.lock().len(), 3);
    }

    #[test]
    fn no_committer_never_checkpoints() {
        let mut sink = BacktestSink::new("run", 4, false, 50, Duration::ZERO);
        assert!(!sink.maybe_checkpoint(Duration::from_secs(100)));
    }
}
