use std::time::Duration;

/// Forward distances (in periods) at which a backtest match is scored.
pub const FORWARD_HORIZONS: [usize; 9] = [1, 2, 3, 4, 5, 10, 15, 22, 30];

/// How long a blocked worker waits on the task queue before re-checking cancellation.
pub const WORKER_POLL: Duration = Duration::from_millis(100);

pub mod indicators {
    pub const RSI_PERIOD: usize = 14;
    pub const CCI_PERIOD: usize = 14;
    pub const AROON_PERIOD: usize = 14;
    pub const MACD_FAST: usize = 12;
    pub const MACD_SLOW: usize = 26;
    pub const MACD_SIGNAL: usize = 9;

    pub const MA_SHORT: usize = 20;
    pub const MA_MID: usize = 50;
    pub const MA_LONG: usize = 200;

    /// Volume surge compares the latest bar against this many previous bars
    pub const VOLUME_AVERAGE_WINDOW: usize = 20;
    /// Regression window used for the trend label
    pub const TREND_WINDOW: usize = 10;

    pub const WEEKS_52: usize = 250;
}

pub mod scan {
    /// Default item-level parameters, used when a request does not supply its own
    pub const MA_LENGTH: usize = 7;
    pub const DAYS_FOR_LOWEST_VOLUME: usize = 30;
    pub const MIN_RSI: f64 = 0.0;
    pub const MAX_RSI: f64 = 100.0;
    pub const MIN_CCI: f64 = -100.0;
    pub const MAX_CCI: f64 = 100.0;
    pub const INSIDE_BAR_LOOKBACK: usize = 7;
    pub const CONFLUENCE_PCT: f64 = 1.0;

    /// MA support: price within this % of the moving average
    pub const MA_SUPPORT_BAND_PCT: f64 = 2.0;
    /// "Price rising" mode: minimum daily % change
    pub const PRICE_RISING_PCT: f64 = 2.0;
}

pub mod session {
    /// NSE regular session in IST (UTC+05:30)
    pub const UTC_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;
    pub const OPEN: (u32, u32) = (9, 15);
    pub const CLOSE: (u32, u32) = (15, 30);
}
