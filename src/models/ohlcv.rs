use {
    crate::domain::Candle,
    serde::{Deserialize, Serialize},
};

/// Column-oriented daily history for one item. Rows are in ascending time order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OhlcvTimeSeries {
    pub symbol: String,
    /// Candle duration, e.g. "1d"
    pub interval: String,
    pub timestamps: Vec<i64>,
    pub open_prices: Vec<f64>,
    pub high_prices: Vec<f64>,
    pub low_prices: Vec<f64>,
    pub close_prices: Vec<f64>,
    pub volumes: Vec<f64>,
}

/// Training/forward split of a dataset at a historical as-of date.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Rows up to and including the as-of row
    pub training: OhlcvTimeSeries,
    /// Rows from the as-of row onwards (index 0 is the as-of row)
    pub forward: OhlcvTimeSeries,
}

impl OhlcvTimeSeries {
    pub fn from_candles(symbol: &str, interval: &str, candles: &[Candle]) -> Self {
        let len = candles.len();
        let mut series = Self {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            timestamps: Vec::with_capacity(len),
            open_prices: Vec::with_capacity(len),
            high_prices: Vec::with_capacity(len),
            low_prices: Vec::with_capacity(len),
            close_prices: Vec::with_capacity(len),
            volumes: Vec::with_capacity(len),
        };

        for c in candles {
            series.timestamps.push(c.timestamp_ms);
            series.open_prices.push(c.open);
            series.high_prices.push(c.high);
            series.low_prices.push(c.low);
            series.close_prices.push(c.close);
            series.volumes.push(c.volume);
        }
        series
    }

    pub fn get_candle(&self, idx: usize) -> Candle {
        Candle::new(
            self.timestamps[idx],
            self.open_prices[idx],
            self.high_prices[idx],
            self.low_prices[idx],
            self.close_prices[idx],
            self.volumes[idx],
        )
    }

    pub fn klines(&self) -> usize {
        self.close_prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close_prices.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.close_prices.last().copied()
    }

    /// Copy of rows `[start, end)`, clamped to the available rows.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.klines());
        let start = start.min(end);
        Self {
            symbol: self.symbol.clone(),
            interval: self.interval.clone(),
            timestamps: self.timestamps[start..end].to_vec(),
            open_prices: self.open_prices[start..end].to_vec(),
            high_prices: self.high_prices[start..end].to_vec(),
            low_prices: self.low_prices[start..end].to_vec(),
            close_prices: self.close_prices[start..end].to_vec(),
            volumes: self.volumes[start..end].to_vec(),
        }
    }

    /// Last `n` rows
    pub fn tail(&self, n: usize) -> Self {
        let len = self.klines();
        self.slice(len.saturating_sub(n), len)
    }
}

/// Rewind `full` by `offset` periods.
///
/// With `n` rows the as-of row is `n - 1 - offset`. The training view holds rows
/// `[0, n - offset)` and the forward view rows `[n - 1 - offset, n - offset + forward_window)`
/// clamped to `n`. Returns `None` when the dataset is not deeper than the offset.
pub fn snapshot(full: &OhlcvTimeSeries, offset: usize, forward_window: usize) -> Option<Snapshot> {
    let n = full.klines();
    if offset >= n {
        return None;
    }
    let as_of = n - 1 - offset;
    let training = full.slice(0, as_of + 1);
    let forward_end = n.min(as_of + 1 + forward_window);
    let forward = full.slice(as_of, forward_end);
    Some(Snapshot { training, forward })
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    /// Daily series with the given closes; open = previous close, flat volume.
    pub fn series_from_closes(symbol: &str, closes: &[f64], volume: f64) -> OhlcvTimeSeries {
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let open = if i == 0 { c } else { closes[i - 1] };
                Candle::new(
                    i as i64 * crate::utils::MS_IN_D,
                    open,
                    open.max(c) * 1.01,
                    open.min(c) * 0.99,
                    c,
                    volume,
                )
            })
            .collect();
        OhlcvTimeSeries::from_candles(symbol, "1d", &candles)
    }
}
