//! Screening thresholds (the read-only snapshot handed to every run)

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Thresholds and run settings shared by the dispatcher, workers and collector.
/// Loaded once per run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenerConfig {
    /// Maximum close-price range (%) over the lookback window to count as consolidating
    pub consolidation_pct: f64,
    /// Last volume / average volume needed for a volume surge
    pub volume_ratio: f64,
    pub min_price: f64,
    pub max_price: f64,

    /// How many periods of history the fetch collaborator is asked for
    pub period: usize,
    /// Candle duration handed to the fetch collaborator (e.g. "1d")
    pub duration: String,
    /// Size of the processed (windowed) view
    pub days_to_lookback: usize,

    pub cache_enabled: bool,
    /// Moving averages use EMA instead of SMA
    pub use_ema: bool,

    /// Backtest depth (number of historical offsets) and forward window
    pub backtest_period: usize,

    /// Newly-listed items never fetch more than this many periods
    pub newly_listed_period_cap: usize,
    /// Items whose full history is longer than this are not newly listed
    pub newly_listed_max_age: usize,

    /// Scales the interim flush cadence of long backtests
    pub load_multiplier: usize,
    /// Interim summary is flushed every `interim_flush_batch * load_multiplier` matches
    pub interim_flush_batch: usize,
    /// Elapsed time after which long backtests checkpoint their ledger
    #[serde(with = "duration_secs")]
    pub checkpoint_after: Duration,
    /// How often blocked receivers wake to look at the cancellation signal
    #[serde(with = "duration_millis")]
    pub result_poll_interval: Duration,

    pub proxy: Option<String>,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            consolidation_pct: 10.0,
            volume_ratio: 2.5,
            min_price: 20.0,
            max_price: 50_000.0,
            period: 280,
            duration: "1d".to_string(),
            days_to_lookback: 30,
            cache_enabled: true,
            use_ema: false,
            backtest_period: 30,
            newly_listed_period_cap: 250,
            newly_listed_max_age: 200,
            load_multiplier: 1,
            interim_flush_batch: 50,
            checkpoint_after: Duration::from_secs(5 * 3600),
            result_poll_interval: Duration::from_millis(200),
            proxy: None,
        }
    }
}

impl ScreenerConfig {
    /// Read a JSON config file. Missing keys fall back to the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Periods to fetch for an item. Newly-listed items get a capped lookback.
    pub fn fetch_period(&self, newly_listed_only: bool) -> usize {
        if newly_listed_only {
            self.period.min(self.newly_listed_period_cap)
        } else {
            self.period
        }
    }

    pub(crate) fn interim_flush_every(&self) -> u64 {
        (self.interim_flush_batch.max(1) * self.load_multiplier.max(1)) as u64
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ScreenerConfig =
            serde_json::from_str(r#"{ "volume_ratio": 3.0, "checkpoint_after": 60 }"#).unwrap();
        assert_eq!(config.volume_ratio, 3.0);
        assert_eq!(config.checkpoint_after, Duration::from_secs(60));
        assert_eq!(config.days_to_lookback, 30);
        assert!(config.cache_enabled);
    }

    #[test]
    fn newly_listed_period_is_capped() {
        let config = ScreenerConfig::default();
        assert_eq!(config.fetch_period(false), 280);
        assert_eq!(config.fetch_period(true), 250);

        let short = ScreenerConfig {
            period: 100,
            ..ScreenerConfig::default()
        };
        assert_eq!(short.fetch_period(true), 100);
    }

    #[test]
    fn flush_cadence_scales_with_load() {
        let config = ScreenerConfig {
            load_multiplier: 4,
            ..ScreenerConfig::default()
        };
        assert_eq!(config.interim_flush_every(), 200);
    }
}
