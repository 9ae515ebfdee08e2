//! Candlestick pattern recognition on the latest bars of a series.

use strum_macros::Display;

use crate::domain::{Candle, CandleType};
use crate::models::OhlcvTimeSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CandlePattern {
    #[strum(to_string = "Morning Star")]
    MorningStar,
    #[strum(to_string = "Evening Star")]
    EveningStar,
    #[strum(to_string = "3 White Soldiers")]
    ThreeWhiteSoldiers,
    #[strum(to_string = "3 Black Crows")]
    ThreeBlackCrows,
    #[strum(to_string = "Bullish Engulfing")]
    BullishEngulfing,
    #[strum(to_string = "Bearish Engulfing")]
    BearishEngulfing,
    #[strum(to_string = "Piercing Line")]
    PiercingLine,
    #[strum(to_string = "Dark Cloud Cover")]
    DarkCloudCover,
    #[strum(to_string = "Bullish Harami")]
    BullishHarami,
    #[strum(to_string = "Bearish Harami")]
    BearishHarami,
    Hammer,
    #[strum(to_string = "Inverted Hammer")]
    InvertedHammer,
    #[strum(to_string = "Hanging Man")]
    HangingMan,
    #[strum(to_string = "Shooting Star")]
    ShootingStar,
    #[strum(to_string = "Bullish Marubozu")]
    BullishMarubozu,
    #[strum(to_string = "Bearish Marubozu")]
    BearishMarubozu,
    Doji,
}

impl CandlePattern {
    pub fn is_bullish(&self) -> bool {
        matches!(
            self,
            CandlePattern::MorningStar
                | CandlePattern::ThreeWhiteSoldiers
                | CandlePattern::BullishEngulfing
                | CandlePattern::PiercingLine
                | CandlePattern::BullishHarami
                | CandlePattern::Hammer
                | CandlePattern::InvertedHammer
                | CandlePattern::BullishMarubozu
        )
    }

    pub fn is_bearish(&self) -> bool {
        matches!(
            self,
            CandlePattern::EveningStar
                | CandlePattern::ThreeBlackCrows
                | CandlePattern::BearishEngulfing
                | CandlePattern::DarkCloudCover
                | CandlePattern::BearishHarami
                | CandlePattern::HangingMan
                | CandlePattern::ShootingStar
                | CandlePattern::BearishMarubozu
        )
    }
}

const DOJI_BODY_RATIO: f64 = 0.1;
const MARUBOZU_WICK_RATIO: f64 = 0.05;

/// Strongest pattern formed by the last one to three candles. Multi-candle
/// formations take precedence over single-candle ones.
pub fn detect(series: &OhlcvTimeSeries) -> Option<CandlePattern> {
    let n = series.klines();
    if n == 0 {
        return None;
    }
    let c0 = series.get_candle(n - 1);
    let c1 = (n >= 2).then(|| series.get_candle(n - 2));
    let c2 = (n >= 3).then(|| series.get_candle(n - 3));
    let downtrend = prior_trend(series, n.saturating_sub(1)) < 0.0;

    if let (Some(c1), Some(c2)) = (c1, c2) {
        if let Some(p) = three_candle(&c2, &c1, &c0) {
            return Some(p);
        }
    }
    if let Some(c1) = c1 {
        if let Some(p) = two_candle(&c1, &c0) {
            return Some(p);
        }
    }
    single_candle(&c0, downtrend)
}

/// Close change across the few bars before `end`
fn prior_trend(series: &OhlcvTimeSeries, end: usize) -> f64 {
    let start = end.saturating_sub(5);
    if end <= start {
        return 0.0;
    }
    series.close_prices[end - 1] - series.close_prices[start]
}

fn three_candle(a: &Candle, b: &Candle, c: &Candle) -> Option<CandlePattern> {
    let small_middle = b.body() < a.body() * 0.5 && b.body() < c.body() * 0.5;

    if a.get_type() == CandleType::Bearish
        && small_middle
        && c.get_type() == CandleType::Bullish
        && c.close > a.body_mid()
    {
        return Some(CandlePattern::MorningStar);
    }
    if a.get_type() == CandleType::Bullish
        && small_middle
        && c.get_type() == CandleType::Bearish
        && c.close < a.body_mid()
    {
        return Some(CandlePattern::EveningStar);
    }

    let all_bull = [a, b, c].iter().all(|x| x.get_type() == CandleType::Bullish && x.body() > 0.0);
    if all_bull && b.close > a.close && c.close > b.close && b.open > a.open && c.open > b.open {
        return Some(CandlePattern::ThreeWhiteSoldiers);
    }
    let all_bear = [a, b, c]
        .iter()
        .all(|x| x.get_type() == CandleType::Bearish && x.body() > 0.0);
    if all_bear && b.close < a.close && c.close < b.close && b.open < a.open && c.open < b.open {
        return Some(CandlePattern::ThreeBlackCrows);
    }
    None
}

fn two_candle(prev: &Candle, cur: &Candle) -> Option<CandlePattern> {
    let (p_lo, p_hi) = prev.body_range();
    let (c_lo, c_hi) = cur.body_range();
    let prev_type = prev.get_type();
    let cur_type = cur.get_type();

    if prev.body() == 0.0 || cur.body() == 0.0 {
        return None;
    }

    if prev_type == CandleType::Bearish && cur_type == CandleType::Bullish {
        if c_lo <= p_lo && c_hi >= p_hi && cur.body() > prev.body() {
            return Some(CandlePattern::BullishEngulfing);
        }
        if cur.open < prev.close && cur.close > prev.body_mid() && cur.close < prev.open {
            return Some(CandlePattern::PiercingLine);
        }
        if c_lo > p_lo && c_hi < p_hi {
            return Some(CandlePattern::BullishHarami);
        }
    }
    if prev_type == CandleType::Bullish && cur_type == CandleType::Bearish {
        if c_lo <= p_lo && c_hi >= p_hi && cur.body() > prev.body() {
            return Some(CandlePattern::BearishEngulfing);
        }
        if cur.open > prev.close && cur.close < prev.body_mid() && cur.close > prev.open {
            return Some(CandlePattern::DarkCloudCover);
        }
        if c_lo > p_lo && c_hi < p_hi {
            return Some(CandlePattern::BearishHarami);
        }
    }
    None
}

fn single_candle(c: &Candle, downtrend: bool) -> Option<CandlePattern> {
    let range = c.range();
    if range <= 0.0 {
        return None;
    }
    let body = c.body();
    if body / range < DOJI_BODY_RATIO {
        return Some(CandlePattern::Doji);
    }
    if c.upper_wick() / range < MARUBOZU_WICK_RATIO && c.lower_wick() / range < MARUBOZU_WICK_RATIO
    {
        return Some(match c.get_type() {
            CandleType::Bullish => CandlePattern::BullishMarubozu,
            CandleType::Bearish => CandlePattern::BearishMarubozu,
        });
    }
    let long_lower = c.lower_wick() >= body * 2.0 && c.upper_wick() <= body * 0.5;
    let long_upper = c.upper_wick() >= body * 2.0 && c.lower_wick() <= body * 0.5;
    match (long_lower, long_upper, downtrend) {
        (true, _, true) => Some(CandlePattern::Hammer),
        (true, _, false) => Some(CandlePattern::HangingMan),
        (_, true, true) => Some(CandlePattern::InvertedHammer),
        (_, true, false) => Some(CandlePattern::ShootingStar),
        _ => None,
    }
}
