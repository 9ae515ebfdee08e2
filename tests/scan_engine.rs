use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use market_sieve::data::{DataFetcher, FetchError, FetchRequest, OutcomeCommitter};
use market_sieve::domain::Candle;
use market_sieve::models::OutcomeLedger;
use market_sieve::utils::{MS_IN_D, MarketClock};
use market_sieve::{
    CancellationSignal, ChartPattern, OhlcvTimeSeries, ScanMode, ScanRequest, ScreenerConfig, ScreenerEngine,
    StrategySelector,
};

// ─── Instrumented feed ────────────────────────────────────────────────────────

/// In-memory fetch collaborator that counts calls and injects failures.
#[derive(Default)]
struct Feed {
    data: HashMap<String, OhlcvTimeSeries>,
    calls: Mutex<Vec<String>>,
    periods: Mutex<Vec<usize>>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delay: Duration,
    /// Raise the signal when this many fetches have started
    cancel_after: Option<(usize, CancellationSignal)>,
}

impl Feed {
    fn with(mut self, symbol: &str, series: OhlcvTimeSeries) -> Self {
        self.data.insert(symbol.to_string(), series);
        self
    }

    fn calls_for(&self, symbol: &str) -> usize {
        self.calls.lock().iter().filter(|s| s.as_str() == symbol).count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }
}

impl DataFetcher for Feed {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<OhlcvTimeSeries, FetchError> {
        let started = {
            let mut calls = self.calls.lock();
            calls.push(request.symbol.to_string());
            calls.len()
        };
        self.periods.lock().push(request.period);

        if let Some((n, signal)) = &self.cancel_after {
            if started >= *n {
                signal.cancel();
            }
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.panicking.contains(request.symbol) {
            panic!("feed exploded for {}", request.symbol);
        }
        if self.failing.contains(request.symbol) {
            return Err(FetchError::Transient {
                symbol: request.symbol.to_string(),
                message: "connection reset".to_string(),
            });
        }
        match self.data.get(request.symbol) {
            Some(series) => Ok(series.tail(request.period)),
            None => Err(FetchError::Empty {
                symbol: request.symbol.to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct RecordingCommitter {
    commits: Mutex<Vec<(String, usize)>>,
}

impl OutcomeCommitter for RecordingCommitter {
    fn commit(&self, run_id: &str, ledger: &OutcomeLedger) -> anyhow::Result<()> {
        self.commits.lock().push((run_id.to_string(), ledger.len()));
        Ok(())
    }
}

/// `rows` daily bars drifting upwards; flat volume unless `spike`, which
/// makes the last bar trade five times the usual volume.
fn daily_series(symbol: &str, rows: usize, spike: bool) -> OhlcvTimeSeries {
    let candles: Vec<Candle> = (0..rows)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.7).sin() * 3.0 + i as f64 * 0.05;
            let open = close - 0.5;
            let volume = if spike && i + 1 == rows { 5_000.0 } else { 1_000.0 };
            Candle::new(i as i64 * MS_IN_D, open, close + 1.0, open - 1.0, close, volume)
        })
        .collect();
    OhlcvTimeSeries::from_candles(symbol, "1d", &candles)
}

/// 120 bars: a run-up to 200, a slow fade to 150, then a rally back to 195,
/// just under the post-listing high. Neither a contraction nor a rising
/// support line.
fn listing_base_series(symbol: &str) -> OhlcvTimeSeries {
    let closes: Vec<f64> = (0..120)
        .map(|i| match i {
            i if i < 60 => 100.0 + i as f64 * 100.0 / 60.0,
            i if i < 110 => 200.0 - (i - 60) as f64,
            i => 150.0 + (i - 110) as f64 * 5.0,
        })
        .collect();
    let candles: Vec<Candle> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let (high, low) = (open.max(close) * 1.01, open.min(close) * 0.99);
            Candle::new(i as i64 * MS_IN_D, open, high, low, close, 1_000.0)
        })
        .collect();
    OhlcvTimeSeries::from_candles(symbol, "1d", &candles)
}

fn request(universe: &[&str], mode: ScanMode) -> ScanRequest {
    let mut req = ScanRequest::new(
        universe.iter().map(|s| s.to_string()).collect(),
        StrategySelector::new(mode),
    );
    req.market = MarketClock::Fixed(false);
    req
}

fn matched_symbols(report: &market_sieve::ScanReport) -> HashSet<String> {
    report.results.iter().map(|r| r.symbol.clone()).collect()
}

// ─── Scenarios ────────────────────────────────────────────────────────────────

#[test]
fn pass_through_capture_matches_every_item() {
    let feed = Feed::default()
        .with("A", daily_series("A", 120, false))
        .with("B", daily_series("B", 120, false));
    let engine = ScreenerEngine::new(ScreenerConfig::default(), Arc::new(feed));

    let report = engine
        .run(&request(&["A", "B"], ScanMode::FullScan), CancellationSignal::new())
        .unwrap();

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.matched, 2);
    assert_eq!(report.processed, 2);
    assert_eq!(matched_symbols(&report), HashSet::from(["A".to_string(), "B".to_string()]));
    assert!(report.results.iter().all(|r| r.offset == 0));
    assert!(report.results.iter().all(|r| r.display.stock == r.symbol));
}

#[test]
fn volume_threshold_rejects_flat_volume() {
    let feed = Feed::default().with("A", daily_series("A", 120, false));
    let engine = ScreenerEngine::new(ScreenerConfig::default(), Arc::new(feed));

    let report = engine
        .run(&request(&["A"], ScanMode::VolumeSurge), CancellationSignal::new())
        .unwrap();

    assert!(report.results.is_empty());
    assert_eq!(report.matched, 0);
    assert_eq!(report.processed, 1);
}

#[test]
fn volume_surge_matches_the_spike() {
    let feed = Feed::default()
        .with("FLAT", daily_series("FLAT", 120, false))
        .with("SPIKE", daily_series("SPIKE", 120, true));
    let engine = ScreenerEngine::new(ScreenerConfig::default(), Arc::new(feed));

    let report = engine
        .run(&request(&["FLAT", "SPIKE"], ScanMode::VolumeSurge), CancellationSignal::new())
        .unwrap();

    assert_eq!(matched_symbols(&report), HashSet::from(["SPIKE".to_string()]));
    let raw = &report.results[0].raw;
    assert!(raw.volume_ratio.unwrap() >= 2.5);
}

#[test]
fn cache_serves_repeat_requests_when_market_closed() {
    let feed = Arc::new(Feed::default().with("A", daily_series("A", 120, false)));
    let engine = ScreenerEngine::new(ScreenerConfig::default(), feed.clone());

    // two offsets of the same item inside one run, handled by a single worker
    let mut req = request(&["A"], ScanMode::FullScan);
    req.backtest_depth = Some(2);
    req.workers = Some(1);
    let report = engine.run(&req, CancellationSignal::new()).unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(feed.calls_for("A"), 1);
    assert!(engine.cache().contains("A"));

    // the cache outlives the run
    engine
        .run(&request(&["A"], ScanMode::FullScan), CancellationSignal::new())
        .unwrap();
    assert_eq!(feed.calls_for("A"), 1);
}

#[test]
fn open_market_always_refetches() {
    let feed = Arc::new(Feed::default().with("A", daily_series("A", 120, false)));
    let engine = ScreenerEngine::new(ScreenerConfig::default(), feed.clone());

    let mut req = request(&["A"], ScanMode::FullScan);
    req.market = MarketClock::Fixed(true);
    engine.run(&req, CancellationSignal::new()).unwrap();
    engine.run(&req, CancellationSignal::new()).unwrap();

    assert_eq!(feed.calls_for("A"), 2);
    assert!(engine.cache().is_empty());
}

#[test]
fn cache_disallowed_bypasses_cache() {
    let feed = Arc::new(Feed::default().with("A", daily_series("A", 120, false)));
    let engine = ScreenerEngine::new(ScreenerConfig::default(), feed.clone());

    let mut req = request(&["A"], ScanMode::FullScan);
    req.cache_allowed = false;
    engine.run(&req, CancellationSignal::new()).unwrap();
    engine.run(&req, CancellationSignal::new()).unwrap();
    assert_eq!(feed.calls_for("A"), 2);
}

// ─── Properties ───────────────────────────────────────────────────────────────

#[test]
fn short_history_is_processed_but_never_matched() {
    let feed = Feed::default()
        .with("LONG", daily_series("LONG", 120, false))
        .with("SHORT", daily_series("SHORT", 20, false));
    let engine = ScreenerEngine::new(ScreenerConfig::default(), Arc::new(feed));

    let report = engine
        .run(&request(&["LONG", "SHORT"], ScanMode::FullScan), CancellationSignal::new())
        .unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(matched_symbols(&report), HashSet::from(["LONG".to_string()]));
}

#[test]
fn item_faults_are_contained() {
    let mut feed = Feed::default()
        .with("OK1", daily_series("OK1", 120, false))
        .with("OK2", daily_series("OK2", 120, false));
    feed.failing.insert("FAIL".to_string());
    feed.panicking.insert("BOOM".to_string());
    let engine = ScreenerEngine::new(ScreenerConfig::default(), Arc::new(feed));

    let universe = ["OK1", "FAIL", "BOOM", "MISSING", "OK2"];
    let report = engine
        .run(&request(&universe, ScanMode::FullScan), CancellationSignal::new())
        .unwrap();

    assert_eq!(report.processed, 5);
    assert_eq!(report.matched, 2);
    assert_eq!(matched_symbols(&report), HashSet::from(["OK1".to_string(), "OK2".to_string()]));
    assert!(!report.cancelled);
}

#[test]
fn processed_equals_dispatched_and_matched_never_exceeds_it() {
    let mut feed = Feed::default();
    let mut universe = Vec::new();
    for i in 0..40 {
        let symbol = format!("S{:02}", i);
        let rows = if i % 5 == 0 { 10 } else { 90 };
        feed = feed.with(&symbol, daily_series(&symbol, rows, i % 3 == 0));
        universe.push(symbol);
    }
    let engine = ScreenerEngine::new(ScreenerConfig::default(), Arc::new(feed));

    let names: Vec<&str> = universe.iter().map(String::as_str).collect();
    let mut req = request(&names, ScanMode::VolumeSurge);
    req.backtest_depth = Some(3);
    let report = engine.run(&req, CancellationSignal::new()).unwrap();

    assert_eq!(report.dispatched, 120);
    assert_eq!(report.processed, 120);
    assert!(report.matched <= report.processed);
    assert_eq!(report.matched as usize, report.results.len());
}

#[test]
fn matched_set_does_not_depend_on_worker_count() {
    let mut feed = Feed::default();
    let mut universe = Vec::new();
    for i in 0..16 {
        let symbol = format!("W{:02}", i);
        feed = feed.with(&symbol, daily_series(&symbol, 100, i % 2 == 0));
        universe.push(symbol);
    }
    let feed = Arc::new(feed);
    let names: Vec<&str> = universe.iter().map(String::as_str).collect();

    let run_with = |workers: usize| {
        let engine = ScreenerEngine::new(ScreenerConfig::default(), feed.clone());
        let mut req = request(&names, ScanMode::VolumeSurge);
        req.workers = Some(workers);
        let report = engine.run(&req, CancellationSignal::new()).unwrap();
        assert_eq!(report.workers, workers);
        matched_symbols(&report)
    };

    let single = run_with(1);
    let many = run_with(4);
    assert_eq!(single.len(), 8);
    assert_eq!(single, many);
}

#[test]
fn download_only_fills_the_cache_without_results() {
    let feed = Feed::default()
        .with("A", daily_series("A", 120, false))
        .with("B", daily_series("B", 120, false));
    let mut config = ScreenerConfig::default();
    config.cache_enabled = false;
    let engine = ScreenerEngine::new(config, Arc::new(feed));

    let mut req = request(&["A", "B"], ScanMode::FullScan);
    req.download_only = true;
    let report = engine.run(&req, CancellationSignal::new()).unwrap();

    assert!(report.results.is_empty());
    assert_eq!(report.processed, 2);
    assert_eq!(engine.cache().len(), 2);
}

#[test]
fn newly_listed_scan_caps_lookback_and_drops_seasoned_items() {
    let feed = Arc::new(
        Feed::default()
            .with("IPO", daily_series("IPO", 90, false))
            .with("OLD", daily_series("OLD", 400, false)),
    );
    let engine = ScreenerEngine::new(ScreenerConfig::default(), feed.clone());

    let mut req = request(&["IPO", "OLD"], ScanMode::FullScan);
    req.newly_listed_only = true;
    let report = engine.run(&req, CancellationSignal::new()).unwrap();

    assert_eq!(matched_symbols(&report), HashSet::from(["IPO".to_string()]));
    assert_eq!(report.processed, 2);
    assert!(feed.periods.lock().iter().all(|&p| p == 250));
}

#[test]
fn newly_listed_patterns_also_match_a_listing_base() {
    let feed = Arc::new(Feed::default().with("IPO", listing_base_series("IPO")));
    let engine = ScreenerEngine::new(ScreenerConfig::default(), feed);

    for pattern in [ChartPattern::Confluence, ChartPattern::Vcp, ChartPattern::Trendline] {
        let mut req = request(&["IPO"], ScanMode::ChartPattern);
        req.selector = StrategySelector::chart(pattern);
        let report = engine.run(&req, CancellationSignal::new()).unwrap();
        assert_eq!(report.matched, 0, "{pattern} without the newly-listed flag");

        req.newly_listed_only = true;
        let report = engine.run(&req, CancellationSignal::new()).unwrap();
        assert_eq!(report.matched, 1, "{pattern}");
        assert!(report.results[0].display.pattern.contains("IPO Base"));
    }

    // inside bars never fall back to the listing base
    let mut req = request(&["IPO"], ScanMode::ChartPattern);
    req.selector = StrategySelector::chart(ChartPattern::BearishInsideBar);
    req.newly_listed_only = true;
    let report = engine.run(&req, CancellationSignal::new()).unwrap();
    assert_eq!(report.matched, 0);
}

#[test]
fn backtest_ledger_stays_inside_the_window() {
    let feed = Feed::default()
        .with("A", daily_series("A", 80, false))
        .with("B", daily_series("B", 80, false));
    let engine = ScreenerEngine::new(ScreenerConfig::default(), Arc::new(feed));

    let mut req = request(&["A", "B"], ScanMode::FullScan);
    req.backtest_depth = Some(5);
    let report = engine.run(&req, CancellationSignal::new()).unwrap();

    let ledger = report.ledger.expect("backtest keeps a ledger");
    assert_eq!(ledger.window(), 5);
    assert_eq!(ledger.len(), 10);
    for symbol in ["A", "B"] {
        assert!(ledger.rows_for(symbol) <= 5);
        let series = daily_series(symbol, 80, false);
        for row in ledger.rows().into_iter().filter(|r| r.symbol == symbol) {
            let as_of = series.klines() - 1 - row.offset;
            assert_eq!(row.entry_close, series.close_prices[as_of]);
            assert_eq!(row.as_of_ms, series.timestamps[as_of]);
            // horizon 1 exists only when a later row does
            assert_eq!(row.returns[0].is_some(), row.offset >= 1);
        }
    }
}

#[test]
fn long_backtests_checkpoint_to_the_committer() {
    let feed = Feed::default().with("A", daily_series("A", 80, false));
    let mut config = ScreenerConfig::default();
    config.checkpoint_after = Duration::ZERO;
    let committer = Arc::new(RecordingCommitter::default());
    let engine = ScreenerEngine::new(config, Arc::new(feed)).with_committer(committer.clone());

    let mut req = request(&["A"], ScanMode::FullScan);
    req.backtest_depth = Some(4);
    let report = engine.run(&req, CancellationSignal::new()).unwrap();

    let commits = committer.commits.lock();
    // at least one checkpoint plus the final commit
    assert!(commits.len() >= 2);
    assert!(commits.iter().all(|(run, _)| *run == report.run_id));
    assert_eq!(commits.last().map(|(_, rows)| *rows), Some(4));
}

#[test]
fn cancellation_stops_the_run_and_every_worker() {
    let cancel = CancellationSignal::new();
    let mut feed = Feed {
        delay: Duration::from_millis(20),
        cancel_after: Some((6, cancel.clone())),
        ..Feed::default()
    };
    let mut universe = Vec::new();
    for i in 0..60 {
        let symbol = format!("C{:02}", i);
        feed = feed.with(&symbol, daily_series(&symbol, 90, false));
        universe.push(symbol);
    }
    let feed = Arc::new(feed);
    let engine = ScreenerEngine::new(ScreenerConfig::default(), feed.clone());

    let names: Vec<&str> = universe.iter().map(String::as_str).collect();
    let mut req = request(&names, ScanMode::FullScan);
    req.workers = Some(3);
    let report = engine.run(&req, cancel.clone()).unwrap();

    assert!(report.cancelled);
    assert!(report.results.len() < 6);
    assert!(report.matched <= report.processed);
    assert!(feed.total_calls() < 60);

    // only items whose fetch started before the signal can have been accepted
    let before: HashSet<String> = feed.calls.lock()[..5].iter().cloned().collect();
    assert!(matched_symbols(&report).is_subset(&before));

    let deadline = Instant::now() + Duration::from_secs(5);
    while report.context.live_workers() > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(report.context.live_workers(), 0);
}

#[test]
fn pre_cancelled_run_dispatches_nothing_to_results() {
    let feed = Arc::new(Feed::default().with("A", daily_series("A", 90, false)));
    let engine = ScreenerEngine::new(ScreenerConfig::default(), feed.clone());
    let cancel = CancellationSignal::new();
    cancel.cancel();

    let report = engine
        .run(&request(&["A"], ScanMode::FullScan), cancel)
        .unwrap();
    assert!(report.cancelled);
    assert!(report.results.is_empty());
}
