use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::ScreenerConfig;
use crate::data::{DataFetcher, SharedCache};
use crate::engine::{CancellationSignal, ProgressCounters};

/// Everything a run shares between dispatcher, workers and collector.
/// One per run; workers hold it through an `Arc`.
pub struct RunContext {
    pub run_id: String,
    pub config: Arc<ScreenerConfig>,
    pub cache: SharedCache,
    pub counters: Arc<ProgressCounters>,
    pub cancel: CancellationSignal,
    pub fetcher: Arc<dyn DataFetcher>,
    /// Evaluated once at run start
    pub market_open: bool,
    live_workers: AtomicUsize,
}

impl RunContext {
    pub fn new(
        run_id: String,
        config: Arc<ScreenerConfig>,
        cache: SharedCache,
        fetcher: Arc<dyn DataFetcher>,
        cancel: CancellationSignal,
        market_open: bool,
    ) -> Self {
        Self {
            run_id,
            config,
            cache,
            counters: Arc::new(ProgressCounters::new()),
            cancel,
            fetcher,
            market_open,
            live_workers: AtomicUsize::new(0),
        }
    }

    /// Workers still inside their control loop
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    pub(crate) fn worker_started(&self) {
        self.live_workers.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn worker_stopped(&self) {
        self.live_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("market_open", &self.market_open)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("live_workers", &self.live_workers())
            .finish_non_exhaustive()
    }
}
