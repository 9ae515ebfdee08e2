use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::unbounded;
use thiserror::Error;
use uuid::Uuid;

use crate::analysis::rule_for;
use crate::config::ScreenerConfig;
use crate::data::{DataFetcher, OutcomeCommitter, SharedCache};
use crate::domain::StrategySelector;
use crate::models::{EvaluationResult, OutcomeLedger, ScanParams};
use crate::utils::{AppInstant, MarketClock, format_duration};

use super::backtest::BacktestSink;
use super::collector::ResultCollector;
use super::dispatcher::{TaskQueue, WorkerPool, build_work_items, worker_count};
use super::{CancellationSignal, RunContext};

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("scan universe is empty")]
    EmptyUniverse,
    #[error("no decision rule for strategy {0}")]
    UnsupportedStrategy(String),
    #[error("backtest depth must be at least 1")]
    ZeroBacktestDepth,
    #[error("could not start any worker: {0}")]
    Spawn(String),
    #[error("task queue closed before all work was enqueued")]
    QueueClosed,
}

/// One screening or backtest request, as handed over by the front-end.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub universe: Vec<String>,
    pub selector: StrategySelector,
    pub params: ScanParams,
    /// `<= 0` uses the configured ratio
    pub volume_ratio: f64,
    /// `Some(W)` backtests over offsets `W-1..=0`
    pub backtest_depth: Option<usize>,
    pub download_only: bool,
    pub newly_listed_only: bool,
    pub cache_allowed: bool,
    pub verbose: bool,
    /// Overrides the computed worker count
    pub workers: Option<usize>,
    pub market: MarketClock,
}

impl ScanRequest {
    pub fn new(universe: Vec<String>, selector: StrategySelector) -> Self {
        Self {
            universe,
            selector,
            params: ScanParams::default(),
            volume_ratio: 0.0,
            backtest_depth: None,
            download_only: false,
            newly_listed_only: false,
            cache_allowed: true,
            verbose: false,
            workers: None,
            market: MarketClock::Exchange,
        }
    }
}

#[derive(Debug)]
pub struct ScanReport {
    pub run_id: String,
    /// Matches in arrival order
    pub results: Vec<EvaluationResult>,
    pub dispatched: usize,
    pub workers: usize,
    pub processed: u64,
    pub matched: u64,
    pub ledger: Option<OutcomeLedger>,
    pub cancelled: bool,
    /// Market state the run was evaluated under
    pub market_open: bool,
    pub elapsed: Duration,
    /// Run context, for observing workers detached by a cancellation
    pub context: Arc<RunContext>,
}

/// Parallel screening engine. Holds what outlives a single run: the dataset
/// cache, the fetch collaborator and the optional ledger committer.
pub struct ScreenerEngine {
    config: Arc<ScreenerConfig>,
    cache: SharedCache,
    fetcher: Arc<dyn DataFetcher>,
    committer: Option<Arc<dyn OutcomeCommitter>>,
    snapshot_path: Option<PathBuf>,
}

impl ScreenerEngine {
    pub fn new(config: ScreenerConfig, fetcher: Arc<dyn DataFetcher>) -> Self {
        Self {
            config: Arc::new(config),
            cache: SharedCache::new(),
            fetcher,
            committer: None,
            snapshot_path: None,
        }
    }

    pub fn with_cache(mut self, cache: SharedCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_committer(mut self, committer: Arc<dyn OutcomeCommitter>) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn with_snapshot_path(mut self, path: PathBuf) -> Self {
        self.snapshot_path = Some(path);
        self
    }

    pub fn config(&self) -> &ScreenerConfig {
        &self.config
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    fn validate(request: &ScanRequest) -> Result<(), EngineError> {
        if request.universe.is_empty() {
            return Err(EngineError::EmptyUniverse);
        }
        if request.backtest_depth == Some(0) {
            return Err(EngineError::ZeroBacktestDepth);
        }
        if rule_for(&request.selector, request.newly_listed_only).is_none() {
            return Err(EngineError::UnsupportedStrategy(request.selector.to_string()));
        }
        Ok(())
    }

    /// Run one request to completion or cancellation.
    ///
    /// Blocks the calling thread, which acts as the dispatcher and collector.
    pub fn run(&self, request: &ScanRequest, cancel: CancellationSignal) -> Result<ScanReport, EngineError> {
        Self::validate(request)?;
        let started = AppInstant::now();

        // 1. Run-scoped context
        let run_id = Uuid::new_v4().to_string();
        let market_open = request.market.is_open();
        let ctx = Arc::new(RunContext::new(
            run_id.clone(),
            self.config.clone(),
            self.cache.clone(),
            self.fetcher.clone(),
            cancel,
            market_open,
        ));

        // 2. Work items and worker count
        let items = build_work_items(request, &self.config);
        let dispatched = items.len();
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let cache_enabled = self.config.cache_enabled && request.cache_allowed;
        let planned = request
            .workers
            .unwrap_or_else(|| worker_count(dispatched, cores, cache_enabled))
            .max(1);

        log::info!(
            "Run {}: {} on {} items ({} symbols), {} workers, market {}",
            run_id,
            request.selector,
            dispatched,
            request.universe.len(),
            planned,
            if market_open { "open" } else { "closed" }
        );

        // 3. Queues and pool. Shutdown markers match the workers actually started.
        let queue = TaskQueue::with_capacity(dispatched, planned);
        let (result_tx, result_rx) = unbounded();
        let pool = WorkerPool::spawn(planned, &ctx, &queue, &result_tx)?;
        drop(result_tx);
        let workers = pool.len();
        if let Err(e) = queue.populate(items, workers) {
            ctx.cancel.cancel();
            pool.release();
            return Err(e);
        }

        // 4. Collect
        let mut collector = ResultCollector::new(&ctx, dispatched);
        if let Some(depth) = request.backtest_depth {
            let sink = BacktestSink::new(
                &run_id,
                depth,
                request.selector.is_sell_signal(),
                self.config.interim_flush_every(),
                self.config.checkpoint_after,
            )
            .with_committer(self.committer.clone())
            .with_snapshot_path(self.snapshot_path.clone());
            collector = collector.with_backtest(sink);
        }
        let (collected, sink) = collector.run(&result_rx);

        // 5. Tear down
        let cancelled = collected.cancelled || ctx.cancel.is_cancelled();
        if cancelled {
            let dropped = queue.drain();
            drop(queue);
            let detached = pool.release();
            log::warn!(
                "Run {} cancelled: {} queued items dropped, {} workers detached",
                run_id,
                dropped,
                detached
            );
        } else {
            pool.join();
        }
        let ledger = sink.map(BacktestSink::finish);

        let elapsed = started.elapsed();
        let report = ScanReport {
            run_id,
            results: collected.results,
            dispatched,
            workers,
            processed: ctx.counters.processed(),
            matched: ctx.counters.matched(),
            ledger,
            cancelled,
            market_open,
            elapsed,
            context: ctx.clone(),
        };
        log::info!(
            "Run {} finished in {}: {} matched, {} rejected",
            report.run_id,
            format_duration(elapsed.as_millis() as i64),
            report.results.len(),
            collected.rejected
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FetchError, FetchRequest};
    use crate::domain::{ChartPattern, ScanMode};
    use crate::models::OhlcvTimeSeries;

    struct NoData;

    impl DataFetcher for NoData {
        fn fetch(&self, request: &FetchRequest<'_>) -> Result<OhlcvTimeSeries, FetchError> {
            Err(FetchError::Empty {
                symbol: request.symbol.to_string(),
            })
        }
    }

    fn engine() -> ScreenerEngine {
        ScreenerEngine::new(ScreenerConfig::default(), Arc::new(NoData))
    }

    #[test]
    fn invalid_requests_are_refused() {
        let e = engine();
        let empty = ScanRequest::new(vec![], StrategySelector::new(ScanMode::FullScan));
        assert_eq!(
            e.run(&empty, CancellationSignal::new()).unwrap_err(),
            EngineError::EmptyUniverse
        );

        let mut zero = ScanRequest::new(vec!["A".into()], StrategySelector::new(ScanMode::FullScan));
        zero.backtest_depth = Some(0);
        assert_eq!(
            e.run(&zero, CancellationSignal::new()).unwrap_err(),
            EngineError::ZeroBacktestDepth
        );

        let bare_reversal = StrategySelector::new(ScanMode::Reversal);
        let unsupported = ScanRequest::new(vec!["A".into()], bare_reversal);
        assert!(matches!(
            e.run(&unsupported, CancellationSignal::new()),
            Err(EngineError::UnsupportedStrategy(_))
        ));
    }

    #[test]
    fn failed_fetches_are_processed_but_never_matched() {
        let mut request = ScanRequest::new(
            vec!["A".into(), "B".into(), "C".into()],
            StrategySelector::chart(ChartPattern::Vcp),
        );
        request.market = MarketClock::Fixed(false);
        let report = engine().run(&request, CancellationSignal::new()).unwrap();
        assert_eq!(report.dispatched, 3);
        assert_eq!(report.processed, 3);
        assert_eq!(report.matched, 0);
        assert!(report.results.is_empty());
        assert!(!report.cancelled);
    }
}
