//! Work-item construction, the shared task queue and the worker pool.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::config::{DF, ScreenerConfig};
use crate::engine::worker::spawn_worker_thread;
use crate::engine::{EngineError, RunContext, ScanRequest, Task};
use crate::models::{ScanOutcome, WorkItem};

/// Number of workers for a run.
///
/// Never more workers than items, never fewer than two, and one core is left
/// free when the on-disk cache is in play on machines with more than two cores.
pub fn worker_count(items: usize, cores: usize, cache_enabled: bool) -> usize {
    let mut n = items.min(cores).max(1);
    if n == 1 {
        n = 2;
    }
    if cache_enabled && cores > 2 {
        n = n.saturating_sub(1).max(1);
    }
    n
}

/// Expand a request into work items.
///
/// Backtests produce one item per (symbol, offset) with offsets running from
/// `depth - 1` down to `0`; ordinary scans produce one item per symbol.
pub fn build_work_items(request: &ScanRequest, config: &ScreenerConfig) -> Vec<WorkItem> {
    let total = request.universe.len();
    let (offsets, forward_window): (Vec<usize>, usize) = match request.backtest_depth {
        Some(depth) => ((0..depth).rev().collect(), depth),
        None => (vec![0], 0),
    };

    let volume_ratio = if request.volume_ratio > 0.0 {
        request.volume_ratio
    } else {
        config.volume_ratio
    };

    offsets
        .iter()
        .flat_map(|&offset| {
            request.universe.iter().map(move |symbol| WorkItem {
                symbol: symbol.clone(),
                selector: request.selector,
                params: request.params,
                volume_ratio,
                total_symbols: total,
                cache_allowed: request.cache_allowed,
                download_only: request.download_only,
                newly_listed_only: request.newly_listed_only,
                offset,
                forward_window,
                verbose: request.verbose,
            })
        })
        .collect()
}

/// Multi-producer, multi-consumer FIFO of [`Task`]s.
pub struct TaskQueue {
    tx: Sender<Task>,
    rx: Receiver<Task>,
}

impl TaskQueue {
    /// Room for every item plus one shutdown marker per worker, so population never blocks.
    pub fn with_capacity(items: usize, workers: usize) -> Self {
        let (tx, rx) = bounded(items + workers);
        Self { tx, rx }
    }

    pub fn receiver(&self) -> Receiver<Task> {
        self.rx.clone()
    }

    /// Enqueue every item, then one shutdown marker per worker.
    pub fn populate(&self, items: Vec<WorkItem>, workers: usize) -> Result<usize, EngineError> {
        let mut sent = 0;
        for item in items {
            self.tx
                .send(Task::Work(Box::new(item)))
                .map_err(|_| EngineError::QueueClosed)?;
            sent += 1;
        }
        for _ in 0..workers {
            self.tx.send(Task::Shutdown).map_err(|_| EngineError::QueueClosed)?;
        }
        Ok(sent)
    }

    /// Discard everything not yet picked up. Returns the number of work items dropped.
    pub fn drain(&self) -> usize {
        self.rx
            .try_iter()
            .filter(|t| matches!(t, Task::Work(_)))
            .count()
    }
}

/// Handles of the spawned workers for one run.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers. Fails if not a single thread could be started.
    pub fn spawn(
        count: usize,
        ctx: &Arc<RunContext>,
        tasks: &TaskQueue,
        results: &Sender<ScanOutcome>,
    ) -> Result<Self, EngineError> {
        let mut handles = Vec::with_capacity(count);
        let mut last_error = None;
        for id in 1..=count {
            match spawn_worker_thread(id, ctx.clone(), tasks.receiver(), results.clone()) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    log::warn!("Failed to spawn worker {}: {}", id, e);
                    last_error = Some(e);
                }
            }
        }
        if handles.is_empty() {
            return Err(EngineError::Spawn(
                last_error.map(|e| e.to_string()).unwrap_or_default(),
            ));
        }
        if DF.log_workers {
            log::info!("Started {} workers", handles.len());
        }
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Join every worker. Panics inside a worker are logged, not propagated.
    pub fn join(self) {
        for handle in self.handles {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                log::error!("{} terminated abnormally", name);
            }
        }
    }

    /// Join workers that have already exited and detach the rest.
    /// A detached worker observes the cancellation flag at its next checkpoint.
    pub fn release(self) -> usize {
        let mut detached = 0;
        for handle in self.handles {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                detached += 1;
            }
        }
        detached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ScanMode, StrategySelector};
    use crate::models::ScanParams;
    use crate::utils::MarketClock;

    fn request(universe: &[&str], backtest_depth: Option<usize>) -> ScanRequest {
        ScanRequest {
            universe: universe.iter().map(|s| s.to_string()).collect(),
            selector: StrategySelector::new(ScanMode::FullScan),
            params: ScanParams::default(),
            volume_ratio: 0.0,
            backtest_depth,
            download_only: false,
            newly_listed_only: false,
            cache_allowed: true,
            verbose: false,
            workers: None,
            market: MarketClock::Fixed(false),
        }
    }

    #[test]
    fn worker_count_rules() {
        assert_eq!(worker_count(1, 8, false), 2);
        assert_eq!(worker_count(100, 8, false), 8);
        assert_eq!(worker_count(100, 8, true), 7);
        assert_eq!(worker_count(3, 8, false), 3);
        assert_eq!(worker_count(3, 2, true), 2);
        assert_eq!(worker_count(1, 4, true), 1);
    }

    #[test]
    fn scan_items_are_one_per_symbol() {
        let config = ScreenerConfig::default();
        let items = build_work_items(&request(&["A", "B", "C"], None), &config);
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i.offset == 0 && i.forward_window == 0));
        assert!(items.iter().all(|i| i.total_symbols == 3));
        assert!(items.iter().all(|i| i.volume_ratio == config.volume_ratio));
    }

    #[test]
    fn backtest_items_run_oldest_offset_first() {
        let config = ScreenerConfig::default();
        let items = build_work_items(&request(&["A", "B"], Some(3)), &config);
        let offsets: Vec<usize> = items.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![2, 2, 1, 1, 0, 0]);
        assert!(items.iter().all(|i| i.forward_window == 3));
    }

    #[test]
    fn queue_holds_items_then_one_shutdown_per_worker() {
        let config = ScreenerConfig::default();
        let items = build_work_items(&request(&["A", "B"], None), &config);
        let queue = TaskQueue::with_capacity(items.len(), 3);
        assert_eq!(queue.populate(items, 3).unwrap(), 2);

        let rx = queue.receiver();
        let tasks: Vec<Task> = rx.try_iter().collect();
        assert_eq!(tasks.len(), 5);
        assert!(matches!(tasks[0], Task::Work(_)));
        assert!(matches!(tasks[1], Task::Work(_)));
        assert!(tasks[2..].iter().all(|t| matches!(t, Task::Shutdown)));
    }

    #[test]
    fn drain_counts_only_work() {
        let config = ScreenerConfig::default();
        let items = build_work_items(&request(&["A", "B", "C"], None), &config);
        let queue = TaskQueue::with_capacity(items.len(), 2);
        queue.populate(items, 2).unwrap();
        assert_eq!(queue.drain(), 3);
        assert!(queue.receiver().try_recv().is_err());
    }
}
