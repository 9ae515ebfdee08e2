mod evaluation;
mod ledger;
mod ohlcv;
mod work_item;

pub use evaluation::{DisplayRecord, EvaluationResult, NoMatchReason, RawRecord, ScanOutcome};
pub use ledger::{HorizonReturns, HorizonSummary, LedgerError, LedgerRow, OutcomeLedger};
pub use ohlcv::{OhlcvTimeSeries, Snapshot, snapshot};
pub use work_item::{ScanParams, WorkItem};

#[cfg(test)]
pub(crate) use ohlcv::test_utils;
