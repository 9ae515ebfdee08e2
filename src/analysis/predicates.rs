//! The ordered predicate battery.
//!
//! Predicates are independent: each reads the item's views, writes its own
//! columns into the display/raw records and raises signals. A failing predicate
//! leaves a neutral placeholder and the remaining ones still run.

use std::panic::{AssertUnwindSafe, catch_unwind};

use thiserror::Error;

use crate::analysis::candle_patterns;
use crate::analysis::indicators::{self, last_defined};
use crate::analysis::preprocess::ProcessedView;
use crate::analysis::strategy_table::{Signal, SignalSet};
use crate::config::ScreenerConfig;
use crate::config::constants::{indicators as periods, scan};
use crate::config::DF;
use crate::domain::CandleType;
use crate::models::{DisplayRecord, OhlcvTimeSeries, RawRecord, WorkItem};
use crate::utils::{linear_slope, mean_and_stddev, pct_change};

#[derive(Debug, Error, PartialEq)]
pub enum PredicateError {
    #[error("{predicate}: needs {needed} rows, have {have}")]
    InsufficientData {
        predicate: &'static str,
        needed: usize,
        have: usize,
    },
    #[error("{predicate}: {what} is undefined")]
    Undefined {
        predicate: &'static str,
        what: &'static str,
    },
    #[error("{predicate} panicked")]
    Panicked { predicate: &'static str },
}

/// Everything a predicate may read
pub struct PredicateInput<'a> {
    pub item: &'a WorkItem,
    pub config: &'a ScreenerConfig,
    /// Whole history up to the as-of row
    pub full: &'a OhlcvTimeSeries,
    pub view: &'a ProcessedView,
}

/// Parallel display/raw output records
#[derive(Debug, Clone, Default)]
pub struct Records {
    pub display: DisplayRecord,
    pub raw: RawRecord,
}

impl Records {
    pub fn new(symbol: &str) -> Self {
        let mut records = Self::default();
        records.display.stock = symbol.to_string();
        records.raw.stock = symbol.to_string();
        records
    }

    fn placeholder(&mut self, column: Column) {
        const NA: &str = "-";
        match column {
            Column::Ltp => {
                self.display.ltp = NA.into();
                self.display.change_pct = NA.into();
                self.raw.ltp = None;
                self.raw.change_pct = None;
            }
            Column::Consolidation => {
                self.display.consolidating = NA.into();
                self.raw.consolidation_pct = None;
            }
            Column::MaSignal => {
                self.display.ma_signal = NA.into();
                self.raw.ma_signal = None;
            }
            Column::Breakout => {
                self.display.breakout = NA.into();
                self.raw.breakout_level = None;
            }
            Column::Volume => {
                self.display.volume = NA.into();
                self.raw.volume_ratio = None;
            }
            Column::Rsi => {
                self.display.rsi = NA.into();
                self.raw.rsi = None;
            }
            Column::Trend => {
                self.display.trend = "Unknown".into();
                self.raw.trend = Some("Unknown".into());
            }
            Column::Cci => {
                self.display.cci = NA.into();
                self.raw.cci = None;
            }
            // Pattern findings are appended; a failed pattern check adds nothing
            Column::Pattern => {}
        }
    }

    fn add_pattern(&mut self, label: &str) {
        let current = &mut self.display.pattern;
        if !current.is_empty() {
            current.push_str(", ");
        }
        current.push_str(label);
        self.raw.pattern = Some(current.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Ltp,
    Consolidation,
    MaSignal,
    Breakout,
    Volume,
    Rsi,
    Trend,
    Cci,
    Pattern,
}

type PredicateFn = fn(&PredicateInput<'_>, &mut Records, &mut SignalSet) -> Result<(), PredicateError>;

pub struct PredicateSpec {
    pub name: &'static str,
    /// Core predicates fill the display columns and always run
    pub core: bool,
    pub column: Column,
    pub produces: &'static [Signal],
    pub run: PredicateFn,
}

macro_rules! predicate {
    ($name:literal, core, $column:ident, [$($sig:ident),*], $run:path) => {
        PredicateSpec { name: $name, core: true, column: Column::$column, produces: &[$(Signal::$sig),*], run: $run }
    };
    ($name:literal, $column:ident, [$($sig:ident),*], $run:path) => {
        PredicateSpec { name: $name, core: false, column: Column::$column, produces: &[$(Signal::$sig),*], run: $run }
    };
}

#[rustfmt::skip]
pub static BATTERY: &[PredicateSpec] = &[
    predicate!("price_band", core, Ltp, [ValidPrice, PriceRising], price_band),
    predicate!("consolidation", core, Consolidation, [Consolidating], consolidation),
    predicate!("moving_averages", core, MaSignal, [MaBullish, MaBearish], moving_averages),
    predicate!("volume", core, Volume, [VolumeSurge], volume),
    predicate!("breakout", core, Breakout, [Breakout], breakout),
    predicate!("lowest_volume", Volume, [LowestVolume], lowest_volume),
    predicate!("rsi", core, Rsi, [RsiInBand], rsi),
    predicate!("trend", core, Trend, [], trend),
    predicate!("cci", core, Cci, [CciInBand], cci),
    predicate!("candlestick", core, Pattern, [BullishCandle, BearishCandle], candlestick),
    predicate!("ipo_base", Pattern, [IpoBase], ipo_base),
    predicate!("confluence", Pattern, [Confluence], confluence),
    predicate!("inside_bar", Pattern, [BullishInsideBar, BearishInsideBar], inside_bar),
    predicate!("narrow_range", Pattern, [NarrowRange], narrow_range),
    predicate!("momentum", Pattern, [Momentum], momentum),
    predicate!("vsa", Pattern, [VsaBullish], volume_spread),
    predicate!("ma_support", MaSignal, [MaSupport], ma_support),
    predicate!("vcp", Pattern, [Vcp], vcp),
    predicate!("trendline", Pattern, [Trendline], trendline),
    predicate!("short_term_bullish", Pattern, [ShortTermBullish], short_term_bullish),
    predicate!("price_volume_breakout", Pattern, [PriceVolumeBreakout], price_volume_breakout),
    predicate!("intraday_rsi_macd", Pattern, [IntradayRsiMacd], rsi_macd),
    predicate!("nr4", Pattern, [Nr4], nr4),
    predicate!("52w_low_breakout", Pattern, [Low52WeekBreakout], low_52_week_breakout),
    predicate!("10d_low_breakout", Pattern, [Low10DayBreakout], low_10_day_breakout),
    predicate!("52w_high_breakout", Pattern, [High52WeekBreakout], high_52_week_breakout),
    predicate!("aroon_crossover", Pattern, [AroonCrossover], aroon_crossover),
    predicate!("macd_below_zero", Pattern, [MacdBelowZero], macd_below_zero),
    predicate!("bullish_tomorrow", Pattern, [BullishTomorrow], bullish_tomorrow),
];

/// Run the battery in order. Non-core predicates only run when one of their
/// signals is in `required`.
pub fn run_battery(input: &PredicateInput<'_>, required: &[Signal]) -> (Records, SignalSet) {
    let mut records = Records::new(&input.item.symbol);
    let mut signals = SignalSet::default();

    for spec in BATTERY {
        if !spec.core && !spec.produces.iter().any(|s| required.contains(s)) {
            continue;
        }
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            (spec.run)(input, &mut records, &mut signals)
        }))
        .unwrap_or(Err(PredicateError::Panicked {
            predicate: spec.name,
        }));

        if let Err(e) = outcome {
            if DF.log_predicates {
                log::debug!("{}: {} (placeholder used)", input.item.symbol, e);
            }
            records.placeholder(spec.column);
            spec.produces.iter().for_each(|s| signals.set(*s, false));
        }
    }
    (records, signals)
}

// --- helpers ---

fn need(predicate: &'static str, have: usize, needed: usize) -> Result<(), PredicateError> {
    if have < needed {
        return Err(PredicateError::InsufficientData {
            predicate,
            needed,
            have,
        });
    }
    Ok(())
}

fn defined(predicate: &'static str, what: &'static str, v: Option<f64>) -> Result<f64, PredicateError> {
    v.ok_or(PredicateError::Undefined { predicate, what })
}

/// Value `back` rows before the last one
fn nth_back(series: &[f64], back: usize) -> Option<f64> {
    let n = series.len();
    if back >= n {
        return None;
    }
    Some(series[n - 1 - back]).filter(|v| !v.is_nan())
}

/// Up to `n` values immediately before the last one
fn prior(values: &[f64], n: usize) -> &[f64] {
    let end = values.len().saturating_sub(1);
    &values[end.saturating_sub(n)..end]
}

fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn min_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

fn last(values: &[f64]) -> f64 {
    values.last().copied().unwrap_or(f64::NAN)
}

// --- core predicates ---

fn price_band(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let close = &i.full.close_prices;
    need("price_band", close.len(), 1)?;
    let ltp = last(close);
    let change = nth_back(close, 1).map(|prev| pct_change(prev, ltp)).unwrap_or(0.0);

    r.display.ltp = format!("{:.2}", ltp);
    r.display.change_pct = format!("{:+.1}%", change);
    r.raw.ltp = Some(ltp);
    r.raw.change_pct = Some(change);

    s.set(Signal::ValidPrice, ltp >= i.config.min_price && ltp <= i.config.max_price);
    s.set(Signal::PriceRising, change >= scan::PRICE_RISING_PCT);
    Ok(())
}

fn consolidation(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let close = &i.view.series.close_prices;
    need("consolidation", close.len(), 2)?;
    let hi = max_of(close);
    let lo = min_of(close);
    let pct = if lo > 0.0 { (hi - lo) / lo * 100.0 } else { 0.0 };

    r.display.consolidating = format!("Range = {:.1}%", pct);
    r.raw.consolidation_pct = Some(pct);
    s.set(Signal::Consolidating, pct != 0.0 && pct <= i.config.consolidation_pct);
    Ok(())
}

const MA_RANGE_PCT: f64 = 1.25;

fn moving_averages(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let v = i.view;
    let close = &v.series.close_prices;
    need("moving_averages", close.len(), 2)?;
    let ma = defined("moving_averages", "short MA", last_defined(&v.ma_short))?;
    let prev_ma = defined("moving_averages", "short MA", nth_back(&v.ma_short, 1))?;
    let c = last(close);
    let prev_c = close[close.len() - 2];
    let low = last(&v.series.low_prices);
    let high = last(&v.series.high_prices);

    let band = ma * MA_RANGE_PCT / 100.0;
    let (label, bullish, bearish) = if prev_c < prev_ma && c > ma {
        ("BullCross-MA", true, false)
    } else if prev_c > prev_ma && c < ma {
        ("BearCross-MA", false, true)
    } else if c > ma && low <= ma + band {
        ("MA-Support", true, false)
    } else if c < ma && high >= ma - band {
        ("MA-Resist", false, true)
    } else if c > ma {
        ("Above MA", false, false)
    } else {
        ("Below MA", false, false)
    };

    r.display.ma_signal = label.to_string();
    r.raw.ma_signal = Some(label.to_string());
    s.set(Signal::MaBullish, bullish);
    s.set(Signal::MaBearish, bearish);
    Ok(())
}

/// Latest volume against the average of the bars before it
fn volume_ratio(series: &OhlcvTimeSeries) -> Result<f64, PredicateError> {
    need("volume", series.klines(), 2)?;
    let history = prior(&series.volumes, periods::VOLUME_AVERAGE_WINDOW);
    let (avg, _) = mean_and_stddev(history);
    if avg <= 0.0 {
        return Err(PredicateError::Undefined {
            predicate: "volume",
            what: "average volume",
        });
    }
    Ok(last(&series.volumes) / avg)
}

fn volume(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let ratio = volume_ratio(&i.view.series)?;
    let threshold = i.item.effective_volume_ratio(i.config.volume_ratio);

    r.display.volume = format!("{:.2}x", ratio);
    r.raw.volume_ratio = Some(ratio);
    s.set(Signal::VolumeSurge, ratio >= threshold);
    Ok(())
}

fn breakout(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let v = &i.view.series;
    need("breakout", v.klines(), 2)?;
    let resistance = max_of(prior(&v.high_prices, v.klines()));
    let c = last(&v.close_prices);
    let is_breaking = c > resistance;

    r.display.breakout = if is_breaking {
        format!("BO: {:.2}", resistance)
    } else {
        format!("R: {:.2}", resistance)
    };
    r.raw.breakout_level = Some(resistance);
    s.set(Signal::Breakout, is_breaking);
    Ok(())
}

fn lowest_volume(i: &PredicateInput<'_>, _r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let days = i.item.params.days_for_lowest_volume.max(2);
    need("lowest_volume", i.full.klines(), days)?;
    let window = &i.full.volumes[i.full.klines() - days..];
    s.set(Signal::LowestVolume, last(window) <= min_of(window));
    Ok(())
}

fn rsi(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let value = defined("rsi", "RSI", last_defined(&i.view.rsi))?;
    let p = &i.item.params;

    r.display.rsi = format!("{:.0}", value);
    r.raw.rsi = Some(value);
    s.set(Signal::RsiInBand, value >= p.min_rsi && value <= p.max_rsi);
    Ok(())
}

fn trend_label(angle: f64) -> &'static str {
    match angle {
        a if a >= 60.0 => "Strong Up",
        a if a >= 30.0 => "Weak Up",
        a if a <= -60.0 => "Strong Down",
        a if a <= -30.0 => "Weak Down",
        _ => "Sideways",
    }
}

fn trend(i: &PredicateInput<'_>, r: &mut Records, _s: &mut SignalSet) -> Result<(), PredicateError> {
    let close = &i.view.series.close_prices;
    need("trend", close.len(), periods::TREND_WINDOW)?;
    let angle = linear_slope(&close[close.len() - periods::TREND_WINDOW..]);
    let label = trend_label(angle);

    r.display.trend = format!("{} ({:.0}°)", label, angle);
    r.raw.trend = Some(label.to_string());
    Ok(())
}

fn cci(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let value = defined("cci", "CCI", last_defined(&i.view.cci))?;
    let p = &i.item.params;

    r.display.cci = format!("{:.0}", value);
    r.raw.cci = Some(value);
    s.set(Signal::CciInBand, value >= p.min_cci && value <= p.max_cci);
    Ok(())
}

fn candlestick(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    if let Some(pattern) = candle_patterns::detect(&i.view.series) {
        r.add_pattern(&pattern.to_string());
        s.set(Signal::BullishCandle, pattern.is_bullish());
        s.set(Signal::BearishCandle, pattern.is_bearish());
    }
    Ok(())
}

// --- mode-specific predicates ---

const IPO_BASE_FROM_HIGH: f64 = 0.9;

/// Newly listed item trading back near its post-listing high
fn ipo_base(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let f = i.full;
    need("ipo_base", f.klines(), 2)?;
    let listing_high = max_of(prior(&f.high_prices, f.klines()));
    let c = last(&f.close_prices);
    let is_base = c >= listing_high * IPO_BASE_FROM_HIGH && c <= listing_high;
    if is_base {
        r.add_pattern(&format!("IPO Base ({:.1}%)", pct_change(listing_high, c)));
    }
    s.set(Signal::IpoBase, is_base);
    Ok(())
}

fn confluence(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let v = i.view;
    let mid = defined("confluence", "mid MA", last_defined(&v.ma_mid))?;
    let long = defined("confluence", "long MA", last_defined(&v.ma_long))?;
    let c = last(&v.series.close_prices);
    let spread = (mid - long).abs() / c * 100.0;
    let is_confluence = spread <= i.item.params.confluence_pct;
    if is_confluence {
        r.add_pattern(&format!("Confluence ({:.2}%)", spread));
    }
    s.set(Signal::Confluence, is_confluence);
    Ok(())
}

/// Bars after a mother bar that stay inside its range. Returns (mother index, inside count).
fn find_inside_bars(series: &OhlcvTimeSeries, lookback: usize) -> Option<(usize, usize)> {
    let n = series.klines();
    let start = n.saturating_sub(lookback + 1);
    for mother in start..n.saturating_sub(1) {
        let (hi, lo) = (series.high_prices[mother], series.low_prices[mother]);
        let inside = (mother + 1..n).all(|k| series.high_prices[k] <= hi && series.low_prices[k] >= lo);
        if inside {
            return Some((mother, n - 1 - mother));
        }
    }
    None
}

fn inside_bar(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let v = &i.view.series;
    need("inside_bar", v.klines(), 2)?;
    if let Some((mother, count)) = find_inside_bars(v, i.item.params.inside_bar_lookback) {
        let bullish = v.get_candle(mother).get_type() == CandleType::Bullish;
        r.add_pattern(&format!("Inside Bar ({})", count));
        s.set(Signal::BullishInsideBar, bullish);
        s.set(Signal::BearishInsideBar, !bullish);
    }
    Ok(())
}

/// Latest bar has the smallest range of the last `n`
fn is_narrowest(series: &OhlcvTimeSeries, n: usize) -> bool {
    let len = series.klines();
    let ranges: Vec<f64> = (len - n..len).map(|k| series.high_prices[k] - series.low_prices[k]).collect();
    last(&ranges) <= min_of(&ranges)
}

fn narrow_range(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let n = i.item.params.ma_length.max(2);
    need("narrow_range", i.view.len(), n)?;
    let is_nr = is_narrowest(&i.view.series, n);
    if is_nr {
        r.add_pattern(&format!("NR{}", n));
    }
    s.set(Signal::NarrowRange, is_nr);
    Ok(())
}

fn nr4(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    need("nr4", i.full.klines(), 4)?;
    let is_nr4 = is_narrowest(i.full, 4);
    if is_nr4 {
        r.add_pattern("NR4");
    }
    s.set(Signal::Nr4, is_nr4);
    Ok(())
}

/// Three rising green candles, each opening above the previous open
fn momentum(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let v = &i.view.series;
    need("momentum", v.klines(), 3)?;
    let n = v.klines();
    let c: Vec<_> = (n - 3..n).map(|k| v.get_candle(k)).collect();
    let is_momentum = c.iter().all(|x| x.get_type() == CandleType::Bullish && x.body() > 0.0)
        && c[1].close > c[0].close
        && c[2].close > c[1].close
        && c[1].open > c[0].open
        && c[2].open > c[1].open;
    if is_momentum {
        r.add_pattern("Momentum");
    }
    s.set(Signal::Momentum, is_momentum);
    Ok(())
}

/// High volume on a narrow bar closing in its upper half (absorption)
fn volume_spread(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let v = &i.view.series;
    need("vsa", v.klines(), 3)?;
    let avg_vol = defined("vsa", "volume average", last_defined(&i.view.volume_avg))?;
    let ranges: Vec<f64> = (0..v.klines()).map(|k| v.high_prices[k] - v.low_prices[k]).collect();
    let (avg_range, _) = mean_and_stddev(prior(&ranges, ranges.len()));
    let bar = v.get_candle(v.klines() - 1);
    let upper_half = bar.range() > 0.0 && bar.close >= bar.low + bar.range() / 2.0;

    let is_vsa = bar.volume > avg_vol && bar.range() < avg_range && upper_half;
    if is_vsa {
        r.add_pattern("VSA");
    }
    s.set(Signal::VsaBullish, is_vsa);
    Ok(())
}

/// Price dipped to a rising average and closed back above it
fn ma_support(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let v = i.view;
    let ma = defined("ma_support", "MA", last_defined(&v.ma_custom))?;
    let prev_ma = defined("ma_support", "MA", nth_back(&v.ma_custom, 1))?;
    let c = last(&v.series.close_prices);
    let low = last(&v.series.low_prices);
    let touched = low <= ma * (1.0 + scan::MA_SUPPORT_BAND_PCT / 100.0);
    let is_support = touched && c > ma && ma >= prev_ma;
    if is_support {
        let label = format!("{}MA-Support", i.item.params.ma_length);
        r.display.ma_signal = label.clone();
        r.raw.ma_signal = Some(label);
    }
    s.set(Signal::MaSupport, is_support);
    Ok(())
}

const VCP_BARS: usize = 60;
const VCP_SEGMENTS: usize = 3;

/// Volatility contraction: each segment's range is tighter than the previous
/// one and price sits near the top of the last segment.
fn vcp(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let f = i.full;
    need("vcp", f.klines(), VCP_BARS)?;
    let start = f.klines() - VCP_BARS;
    let seg = VCP_BARS / VCP_SEGMENTS;
    let ranges: Vec<(f64, f64)> = (0..VCP_SEGMENTS)
        .map(|k| {
            let (a, b) = (start + k * seg, start + (k + 1) * seg);
            let hi = max_of(&f.high_prices[a..b]);
            let lo = min_of(&f.low_prices[a..b]);
            (hi, if lo > 0.0 { (hi - lo) / lo } else { 0.0 })
        })
        .collect();

    let contracting = ranges.windows(2).all(|w| w[1].1 < w[0].1);
    let (last_high, _) = ranges[VCP_SEGMENTS - 1];
    let is_vcp = contracting && last(&f.close_prices) >= last_high * 0.95;
    if is_vcp {
        r.add_pattern("VCP");
    }
    s.set(Signal::Vcp, is_vcp);
    Ok(())
}

const TRENDLINE_BARS: usize = 50;
const TRENDLINE_TOUCH_PCT: f64 = 2.0;

/// Rising support line fitted through the lows, with the latest low near it
fn trendline(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let f = i.full;
    need("trendline", f.klines(), TRENDLINE_BARS)?;
    let lows = &f.low_prices[f.klines() - TRENDLINE_BARS..];

    let n = lows.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let (mean_y, _) = mean_and_stddev(lows);
    let (mut num, mut den) = (0.0, 0.0);
    for (x, y) in lows.iter().enumerate() {
        let dx = x as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    let slope = num / den;
    let line_now = mean_y + slope * (n - 1.0 - mean_x);
    let low = last(lows);
    let is_trendline =
        slope > 0.0 && low >= line_now * 0.99 && low <= line_now * (1.0 + TRENDLINE_TOUCH_PCT / 100.0);
    if is_trendline {
        r.add_pattern("Trendline Support");
    }
    s.set(Signal::Trendline, is_trendline);
    Ok(())
}

fn short_term_bullish(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let close = &i.full.close_prices;
    let fast = defined("short_term_bullish", "EMA 9", last_defined(&indicators::ema(9, close)))?;
    let slow = defined("short_term_bullish", "EMA 21", last_defined(&indicators::ema(21, close)))?;
    let mid = defined(
        "short_term_bullish",
        "mid MA",
        last_defined(&indicators::sma(periods::MA_MID, close)),
    )?;
    let is_bullish = fast > slow && last(close) > mid;
    if is_bullish {
        r.add_pattern("Short Term Bullish");
    }
    s.set(Signal::ShortTermBullish, is_bullish);
    Ok(())
}

const PV_BREAKOUT_BARS: usize = 5;

fn price_volume_breakout(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let f = i.full;
    need("price_volume_breakout", f.klines(), PV_BREAKOUT_BARS + 1)?;
    let resistance = max_of(prior(&f.high_prices, PV_BREAKOUT_BARS));
    let (avg_vol, _) = mean_and_stddev(prior(&f.volumes, PV_BREAKOUT_BARS));
    let threshold = i.item.effective_volume_ratio(i.config.volume_ratio);
    let is_breakout = last(&f.close_prices) > resistance && last(&f.volumes) >= avg_vol * threshold;
    if is_breakout {
        r.add_pattern("Price-Volume Breakout");
    }
    s.set(Signal::PriceVolumeBreakout, is_breakout);
    Ok(())
}

fn rsi_macd(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let close = &i.full.close_prices;
    let m = indicators::macd(periods::MACD_FAST, periods::MACD_SLOW, periods::MACD_SIGNAL, close);
    let hist = defined("intraday_rsi_macd", "MACD histogram", last_defined(&m.histogram))?;
    let prev_hist = defined("intraday_rsi_macd", "MACD histogram", nth_back(&m.histogram, 1))?;
    let rsi = defined("intraday_rsi_macd", "RSI", last_defined(&i.view.rsi))?;
    let is_combo = prev_hist <= 0.0 && hist > 0.0 && rsi > 50.0;
    if is_combo {
        r.add_pattern("RSI-MACD Bullish");
    }
    s.set(Signal::IntradayRsiMacd, is_combo);
    Ok(())
}

fn low_breakout(f: &OhlcvTimeSeries, predicate: &'static str, bars: usize) -> Result<bool, PredicateError> {
    need(predicate, f.klines(), 2)?;
    let support = min_of(prior(&f.low_prices, bars));
    Ok(last(&f.low_prices) < support)
}

fn low_52_week_breakout(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let hit = low_breakout(i.full, "52w_low_breakout", periods::WEEKS_52)?;
    if hit {
        r.add_pattern("52W Low Breakdown");
    }
    s.set(Signal::Low52WeekBreakout, hit);
    Ok(())
}

fn low_10_day_breakout(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let hit = low_breakout(i.full, "10d_low_breakout", 10)?;
    if hit {
        r.add_pattern("10D Low Breakdown");
    }
    s.set(Signal::Low10DayBreakout, hit);
    Ok(())
}

fn high_52_week_breakout(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let f = i.full;
    need("52w_high_breakout", f.klines(), 2)?;
    let resistance = max_of(prior(&f.high_prices, periods::WEEKS_52));
    let hit = last(&f.high_prices) > resistance;
    if hit {
        r.add_pattern("52W High Breakout");
    }
    s.set(Signal::High52WeekBreakout, hit);
    Ok(())
}

fn aroon_crossover(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let (up, down) = indicators::aroon(periods::AROON_PERIOD, &i.full.high_prices, &i.full.low_prices);
    let name = "aroon_crossover";
    let (u, d) = (defined(name, "Aroon", last_defined(&up))?, defined(name, "Aroon", last_defined(&down))?);
    let (pu, pd) = (defined(name, "Aroon", nth_back(&up, 1))?, defined(name, "Aroon", nth_back(&down, 1))?);
    let crossed = pu <= pd && u > d;
    if crossed {
        r.add_pattern("Aroon Crossover");
    }
    s.set(Signal::AroonCrossover, crossed);
    Ok(())
}

fn macd_below_zero(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let m = indicators::macd(periods::MACD_FAST, periods::MACD_SLOW, periods::MACD_SIGNAL, &i.full.close_prices);
    let hist = defined("macd_below_zero", "MACD histogram", last_defined(&m.histogram))?;
    let below = hist < 0.0;
    if below {
        r.add_pattern("MACD Hist < 0");
    }
    s.set(Signal::MacdBelowZero, below);
    Ok(())
}

/// Negative MACD histogram that just turned up
fn bullish_tomorrow(i: &PredicateInput<'_>, r: &mut Records, s: &mut SignalSet) -> Result<(), PredicateError> {
    let m = indicators::macd(periods::MACD_FAST, periods::MACD_SLOW, periods::MACD_SIGNAL, &i.full.close_prices);
    let name = "bullish_tomorrow";
    let h0 = defined(name, "MACD histogram", nth_back(&m.histogram, 0))?;
    let h1 = defined(name, "MACD histogram", nth_back(&m.histogram, 1))?;
    let h2 = defined(name, "MACD histogram", nth_back(&m.histogram, 2))?;
    let turning = h0 < 0.0 && h1 < h2 && h0 > h1;
    if turning {
        r.add_pattern("Bullish for Tomorrow");
    }
    s.set(Signal::BullishTomorrow, turning);
    Ok(())
}
