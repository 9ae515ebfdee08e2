mod backtest;
mod cancel;
mod collector;
mod context;
mod core;
mod counters;
mod dispatcher;
mod messages;
mod worker;

pub use backtest::{BacktestSink, ledger_row};
pub use cancel::CancellationSignal;
pub use collector::{Collected, ResultCollector};
pub use context::RunContext;
pub use self::core::{EngineError, ScanReport, ScanRequest, ScreenerEngine};
pub use counters::{ProcessedTicket, Progress, ProgressCounters};
pub use dispatcher::{TaskQueue, WorkerPool, build_work_items, worker_count};
pub use messages::Task;
pub use worker::is_worker_thread;
