use thiserror::Error;

use crate::engine::ProgressCounters;
use crate::models::OhlcvTimeSeries;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    /// Network, timeout or storage failure. Retrying is the fetcher's business.
    #[error("transient fetch failure for {symbol}: {message}")]
    Transient { symbol: String, message: String },
    #[error("no data returned for {symbol}")]
    Empty { symbol: String },
}

/// Arguments of a single fetch
pub struct FetchRequest<'a> {
    pub symbol: &'a str,
    /// Number of periods of history wanted
    pub period: usize,
    /// Candle duration, e.g. "1d"
    pub duration: &'a str,
    pub proxy: Option<&'a str>,
    /// Live run counters, for progress reporting inside long downloads
    pub counters: &'a ProgressCounters,
    pub total: usize,
}

/// Source of raw market data. Called from worker threads, so blocking is fine
/// and implementations must be shareable.
pub trait DataFetcher: Send + Sync {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<OhlcvTimeSeries, FetchError>;
}
