use std::panic;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tabled::Table;
use tokio::runtime::Runtime;

use market_sieve::data::{
    BarStore, SqliteFetcher, SqliteLedgerStore, SqliteStorage, default_cache_path,
    load_cache, save_cache,
};
use market_sieve::models::{DisplayRecord, ScanParams};
use market_sieve::utils::{MarketClock, format_duration};
use market_sieve::{CancellationSignal, Cli, PERSISTENCE, ScanRequest, ScreenerConfig, ScreenerEngine};

fn init_log(verbose: bool) {
    let (global_level, my_code_level) = if cfg!(debug_assertions) {
        (log::LevelFilter::Warn, log::LevelFilter::Info)
    } else {
        (log::LevelFilter::Error, log::LevelFilter::Error)
    };
    let my_code_level = if verbose {
        log::LevelFilter::Debug
    } else {
        my_code_level
    };

    let mut builder = env_logger::Builder::new();
    builder
        .filter(None, global_level)
        .filter(Some("market_sieve"), my_code_level)
        .parse_env("RUST_LOG")
        .init();
}

fn build_request(args: &Cli, config: &ScreenerConfig) -> Result<ScanRequest> {
    let mut params = ScanParams::default();
    if let Some(v) = args.min_rsi {
        params.min_rsi = v;
    }
    if let Some(v) = args.max_rsi {
        params.max_rsi = v;
    }
    if let Some(v) = args.min_cci {
        params.min_cci = v;
    }
    if let Some(v) = args.max_cci {
        params.max_cci = v;
    }

    let mut request = ScanRequest::new(args.universe()?, args.selector());
    request.params = params;
    request.volume_ratio = args.volume_ratio;
    request.backtest_depth = args.backtest.map(|d| if d == 0 { config.backtest_period } else { d });
    request.download_only = args.download_only;
    request.newly_listed_only = args.newly_listed;
    request.cache_allowed = !args.no_cache;
    request.verbose = args.verbose;
    request.workers = args.workers;
    request.market = match args.market_open {
        Some(open) => MarketClock::Fixed(open),
        None => MarketClock::Exchange,
    };
    Ok(request)
}

fn main() -> Result<()> {
    panic::set_hook(Box::new(|info| {
        if market_sieve::engine::is_worker_thread() {
            log::debug!("Item panic on {}: {}", std::thread::current().name().unwrap_or("worker"), info);
            return;
        }
        let backtrace = std::backtrace::Backtrace::force_capture();
        log::error!("CRITICAL PANIC:\n{}\nStack Trace:\n{}", info, backtrace);
    }));

    let args = Cli::parse();
    init_log(args.verbose);

    // 1. Configuration and request
    let config = ScreenerConfig::load_or_default(args.config.as_deref())?;
    let request = build_request(&args, &config)?;
    let duration = config.duration.clone();

    // 2. Storage (async, driven from this thread and the workers through block_on)
    let runtime = Arc::new(Runtime::new().context("Failed to start tokio runtime")?);
    if let Some(parent) = Path::new(&args.db).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let storage = runtime.block_on(async {
        let storage = SqliteStorage::new(&args.db).await?;
        storage.initialize().await?;
        anyhow::Ok(storage)
    })?;
    let fetcher = Arc::new(SqliteFetcher::new(Arc::new(storage), runtime.clone()));

    // 3. Dataset cache from a previous run
    let cache_path = args
        .cache_file
        .clone()
        .unwrap_or_else(|| default_cache_path(&duration));
    let mut engine = ScreenerEngine::new(config, fetcher);
    if cache_path.exists() && !args.no_cache {
        match load_cache(&cache_path, &duration) {
            Ok(cache) => {
                log::info!("Loaded {} cached datasets from {}", cache.len(), cache_path.display());
                engine = engine.with_cache(cache);
            }
            Err(e) => log::warn!("Ignoring cache file: {:#}", e),
        }
    }

    if request.backtest_depth.is_some() {
        engine = engine.with_snapshot_path(PERSISTENCE.ledger.snapshot_path.into());
        if args.commit {
            let store = runtime.block_on(SqliteLedgerStore::new(&args.db, runtime.clone()))?;
            engine = engine.with_committer(Arc::new(store));
        }
    }

    // 4. Ctrl+C cancels the run
    let cancel = CancellationSignal::new();
    {
        let cancel = cancel.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        });
    }

    // 5. Run
    let report = engine.run(&request, cancel)?;

    if !report.results.is_empty() {
        let rows: Vec<DisplayRecord> = report.results.iter().map(|r| r.display.clone()).collect();
        println!("{}", Table::new(rows));
    }
    if let Some(ledger) = &report.ledger {
        println!("{}", ledger.render_summary());
    }
    println!(
        "{} matched of {} processed ({} dispatched) in {}{}",
        report.matched,
        report.processed,
        report.dispatched,
        format_duration(report.elapsed.as_millis() as i64),
        if report.cancelled { " [cancelled]" } else { "" }
    );

    // 6. Persist the cache when the datasets are end-of-day
    let cache_on = engine.config().cache_enabled && request.cache_allowed;
    if !report.cancelled && (request.download_only || (cache_on && !report.market_open)) {
        save_cache(engine.cache(), &duration, &cache_path)?;
    }

    Ok(())
}
