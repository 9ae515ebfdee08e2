use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq)]
pub enum CandleType {
    Bullish,
    Bearish,
}

/// One daily bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp_ms: i64,

    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,

    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp_ms: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Candle {
            timestamp_ms,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn get_type(&self) -> CandleType {
        if self.close >= self.open {
            CandleType::Bullish
        } else {
            CandleType::Bearish
        }
    }

    // Returns the low and high of the candle body as a tuple
    pub fn body_range(&self) -> (f64, f64) {
        match self.get_type() {
            CandleType::Bullish => (self.open, self.close),
            CandleType::Bearish => (self.close, self.open),
        }
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.body_range().1
    }

    pub fn lower_wick(&self) -> f64 {
        self.body_range().0 - self.low
    }

    /// Midpoint of the body
    pub fn body_mid(&self) -> f64 {
        (self.open + self.close) / 2.0
    }
}
