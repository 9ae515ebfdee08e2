//! Worker threads and the per-item evaluation pipeline.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::analysis::{PredicateInput, preprocess, rule_for, run_battery};
use crate::config::{DF, ScreenerConfig};
use crate::config::constants::WORKER_POLL;
use crate::data::FetchRequest;
use crate::engine::{ProcessedTicket, RunContext, Task};
use crate::models::{EvaluationResult, NoMatchReason, OhlcvTimeSeries, ScanOutcome, WorkItem, snapshot};

const THREAD_PREFIX: &str = "sieve-worker-";

/// True on a pool thread. Panics there are caught per item and reported as faults.
pub fn is_worker_thread() -> bool {
    thread::current()
        .name()
        .is_some_and(|name| name.starts_with(THREAD_PREFIX))
}

/// Pipeline states, used for logging transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
enum Stage {
    Fetching,
    Preprocessing,
    Evaluating,
    Publishing,
}

/// Cancellation is observed at every stage boundary
fn checkpoint(ctx: &RunContext, item: &WorkItem, next: Stage) -> Result<(), NoMatchReason> {
    if ctx.cancel.is_cancelled() {
        return Err(NoMatchReason::Cancelled);
    }
    log::trace!("{}@{}: -> {}", item.symbol, item.offset, next);
    Ok(())
}

/// Fresh dataset, or the cached one when reuse is allowed.
fn acquire_dataset(ctx: &RunContext, item: &WorkItem) -> Result<Arc<OhlcvTimeSeries>, NoMatchReason> {
    let config = &ctx.config;
    let cache_enabled = config.cache_enabled && item.cache_allowed;
    let must_fetch = !cache_enabled || item.download_only || ctx.market_open;

    if !must_fetch {
        if let Some(cached) = ctx.cache.get(&item.symbol) {
            if DF.log_cache {
                log::debug!("{}: cache hit ({} rows)", item.symbol, cached.klines());
            }
            return Ok(cached);
        }
    }

    let request = FetchRequest {
        symbol: &item.symbol,
        period: config.fetch_period(item.newly_listed_only),
        duration: &config.duration,
        proxy: config.proxy.as_deref(),
        counters: &ctx.counters,
        total: item.total_symbols,
    };
    let fetched = Arc::new(ctx.fetcher.fetch(&request)?);

    if (cache_enabled && !ctx.market_open) || item.download_only {
        ctx.cache.insert(&item.symbol, fetched.clone());
    }
    Ok(fetched)
}

/// Run one item through fetch, preprocessing and the strategy decision.
///
/// `ticket` is committed once the item is known to be evaluable; earlier exits
/// leave it to the caller's drop.
pub(crate) fn evaluate_item(
    ctx: &RunContext,
    item: &WorkItem,
    ticket: &mut ProcessedTicket<'_>,
) -> Result<EvaluationResult, NoMatchReason> {
    let config: &ScreenerConfig = &ctx.config;

    checkpoint(ctx, item, Stage::Fetching)?;
    let full = crate::trace_time!(Stage::Fetching, item, 50, { acquire_dataset(ctx, item) })?;

    if item.download_only {
        return Err(NoMatchReason::DownloadOnly);
    }
    if full.is_empty() {
        return Err(NoMatchReason::EmptyDataset);
    }

    checkpoint(ctx, item, Stage::Preprocessing)?;
    let required = config.days_to_lookback + item.offset;
    if full.klines() < required {
        return Err(NoMatchReason::InsufficientHistory {
            rows: full.klines(),
            required,
        });
    }

    let snap = snapshot(&full, item.offset, item.forward_window).ok_or(
        NoMatchReason::InsufficientHistory {
            rows: full.klines(),
            required: item.offset + 1,
        },
    )?;
    let view = crate::trace_time!(Stage::Preprocessing, item, 2, {
        preprocess(
            &snap.training,
            config.days_to_lookback,
            item.params.ma_length,
            config.use_ema,
        )
    });

    if item.newly_listed_only && full.klines() > config.newly_listed_max_age {
        return Err(NoMatchReason::NotNewlyListed { age: full.klines() });
    }

    let processed = ticket.commit();
    log::debug!(
        "Processing {} in {}th counter",
        item.symbol,
        processed.unwrap_or_default()
    );

    checkpoint(ctx, item, Stage::Evaluating)?;
    let rule = rule_for(&item.selector, item.newly_listed_only)
        .ok_or_else(|| NoMatchReason::Fault(format!("unsupported strategy {}", item.selector)))?;

    let input = PredicateInput {
        item,
        config,
        full: &snap.training,
        view: &view,
    };
    let (records, signals) = crate::trace_time!(Stage::Evaluating, item, 2, {
        run_battery(&input, &rule.signals())
    });
    if !rule.evaluate(&signals) {
        return Err(NoMatchReason::StrategyRejected);
    }

    checkpoint(ctx, item, Stage::Publishing)?;
    ctx.counters.record_match();
    Ok(EvaluationResult {
        symbol: item.symbol.clone(),
        offset: item.offset,
        display: records.display,
        raw: records.raw,
        dataset: full,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Evaluate one item, swallowing every item-level failure.
/// `None` means the run was cancelled while the item was in flight.
pub(crate) fn process_item(ctx: &RunContext, item: &WorkItem) -> Option<ScanOutcome> {
    let mut ticket = ctx.counters.ticket();
    let result = catch_unwind(AssertUnwindSafe(|| evaluate_item(ctx, item, &mut ticket)))
        .unwrap_or_else(|payload| Err(NoMatchReason::Fault(panic_message(payload.as_ref()))));
    drop(ticket);

    match result {
        Ok(result) => Some(ScanOutcome::Match(Box::new(result))),
        Err(NoMatchReason::Cancelled) => None,
        Err(reason) => {
            if let NoMatchReason::Fault(msg) = &reason {
                if item.verbose {
                    log::warn!("{}@{}: {}", item.symbol, item.offset, msg);
                } else {
                    log::debug!("{}@{}: {}", item.symbol, item.offset, msg);
                }
            } else {
                log::debug!("{}@{}: {}", item.symbol, item.offset, reason);
            }
            Some(ScanOutcome::NoMatch {
                symbol: item.symbol.clone(),
                offset: item.offset,
                reason,
            })
        }
    }
}

/// Keeps the live-worker count honest however the loop exits.
struct LiveGuard<'a>(&'a RunContext);

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.0.worker_stopped();
    }
}

fn worker_loop(id: usize, ctx: Arc<RunContext>, tasks: Receiver<Task>, results: Sender<ScanOutcome>) {
    let _guard = LiveGuard(ctx.as_ref());
    let mut handled = 0usize;

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let item = match tasks.recv_timeout(WORKER_POLL) {
            Ok(Task::Work(item)) => item,
            Ok(Task::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let Some(outcome) = process_item(&ctx, &item) else {
            break;
        };
        handled += 1;
        if ctx.cancel.is_cancelled() || results.send(outcome).is_err() {
            break;
        }
    }

    if DF.log_workers {
        log::debug!("{}{} exiting after {} items", THREAD_PREFIX, id, handled);
    }
}

/// Start a named worker thread. The live count is raised before the thread runs.
pub(crate) fn spawn_worker_thread(
    id: usize,
    ctx: Arc<RunContext>,
    tasks: Receiver<Task>,
    results: Sender<ScanOutcome>,
) -> std::io::Result<JoinHandle<()>> {
    ctx.worker_started();
    let thread_ctx = ctx.clone();
    let spawned = thread::Builder::new()
        .name(format!("{}{}", THREAD_PREFIX, id))
        .spawn(move || worker_loop(id, thread_ctx, tasks, results));
    if spawned.is_err() {
        ctx.worker_stopped();
    }
    spawned
}
