//! Result collector: drains the result queue until every dispatched item has
//! reported or the run is cancelled.

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::config::DF;
use crate::engine::RunContext;
use crate::engine::backtest::BacktestSink;
use crate::models::{EvaluationResult, ScanOutcome};
use crate::utils::AppInstant;

/// What the collector saw before it stopped.
#[derive(Debug, Default)]
pub struct Collected {
    pub results: Vec<EvaluationResult>,
    pub received: usize,
    pub rejected: usize,
    pub cancelled: bool,
}

/// Received counts that get an info-level progress line: every `step`th
/// outcome and the last one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ProgressCadence {
    step: usize,
    total: usize,
}

impl ProgressCadence {
    /// Progress lines per run
    const LINES: usize = 20;

    pub(crate) fn new(total: usize) -> Self {
        Self {
            step: (total / Self::LINES).max(1),
            total,
        }
    }

    pub(crate) fn is_due(&self, received: usize) -> bool {
        received > 0 && (received == self.total || received % self.step == 0)
    }
}

pub struct ResultCollector<'a> {
    ctx: &'a RunContext,
    expected: usize,
    sink: Option<BacktestSink>,
}

impl<'a> ResultCollector<'a> {
    pub fn new(ctx: &'a RunContext, expected: usize) -> Self {
        Self {
            ctx,
            expected,
            sink: None,
        }
    }

    pub fn with_backtest(mut self, sink: BacktestSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Block until `expected` outcomes arrived, the run is cancelled, or every worker hung up.
    pub fn run(mut self, results: &Receiver<ScanOutcome>) -> (Collected, Option<BacktestSink>) {
        let started = AppInstant::now();
        let poll = self.ctx.config.result_poll_interval;
        let total = self.expected as u64;
        let cadence = ProgressCadence::new(self.expected);
        let mut out = Collected::default();

        while out.received < self.expected {
            if self.ctx.cancel.is_cancelled() {
                out.cancelled = true;
                break;
            }

            match results.recv_timeout(poll) {
                Ok(outcome) => {
                    // anything arriving after the signal is dropped
                    if self.ctx.cancel.is_cancelled() {
                        out.cancelled = true;
                        break;
                    }
                    out.received += 1;
                    if DF.log_collector {
                        log::debug!("COLLECTOR: outcome {} of {}: {}", out.received, total, outcome.symbol());
                    }
                    self.accept(outcome, &mut out);
                    if cadence.is_due(out.received) {
                        log::info!("{}", self.ctx.counters.progress(total));
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if out.received < self.expected {
                        log::warn!(
                            "Result queue closed after {}/{} outcomes",
                            out.received,
                            self.expected
                        );
                    }
                    break;
                }
            }

            if let Some(sink) = self.sink.as_mut() {
                sink.maybe_checkpoint(started.elapsed());
            }
        }

        if !cadence.is_due(out.received) {
            log::info!("{}", self.ctx.counters.progress(total));
        }
        (out, self.sink)
    }

    fn accept(&mut self, outcome: ScanOutcome, out: &mut Collected) {
        match outcome {
            ScanOutcome::Match(result) => {
                if let Some(sink) = self.sink.as_mut() {
                    if let Err(e) = sink.fold(&result) {
                        log::warn!("{}", e);
                    }
                }
                out.results.push(*result);
            }
            ScanOutcome::NoMatch { .. } => out.rejected += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_reports_every_twentieth_and_the_last() {
        let cadence = ProgressCadence::new(100);
        let due: Vec<usize> = (0..=100).filter(|&n| cadence.is_due(n)).collect();
        assert_eq!(due.len(), 20);
        assert_eq!(due[0], 5);
        assert_eq!(due.last(), Some(&100));

        let odd = ProgressCadence::new(45);
        assert!(odd.is_due(2));
        assert!(odd.is_due(45));
        assert!(!odd.is_due(3));
    }

    #[test]
    fn small_runs_report_every_outcome() {
        let cadence = ProgressCadence::new(3);
        assert!(!cadence.is_due(0));
        assert!((1..=3).all(|n| cadence.is_due(n)));
        assert!(!ProgressCadence::new(0).is_due(0));
    }
}
