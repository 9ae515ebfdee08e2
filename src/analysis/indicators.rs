//! Technical indicators over price columns.
//!
//! Every function returns a series aligned with its input: same length, `NaN`
//! where the indicator is not yet defined.

pub fn sma(period: usize, data: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; data.len()];
    if period == 0 || data.len() < period {
        return out;
    }
    for (i, w) in data.windows(period).enumerate() {
        out[i + period - 1] = w.iter().sum::<f64>() / period as f64;
    }
    out
}

/// Exponential average seeded with the SMA of the first `period` values.
pub fn ema(period: usize, data: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; data.len()];
    if period == 0 || data.len() < period {
        return out;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut prev = data[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = prev;
    for i in period..data.len() {
        prev = data[i] * k + prev * (1.0 - k);
        out[i] = prev;
    }
    out
}

/// Moving average selected by configuration.
pub fn moving_average(period: usize, data: &[f64], use_ema: bool) -> Vec<f64> {
    if use_ema { ema(period, data) } else { sma(period, data) }
}

/// Wilder's RSI
pub fn rsi(period: usize, data: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; data.len()];
    if period == 0 || data.len() <= period {
        return out;
    }
    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let diff = data[i] - data[i - 1];
        if diff >= 0.0 {
            gains += diff;
        } else {
            losses -= diff;
        }
    }
    let p = period as f64;
    let mut avg_gain = gains / p;
    let mut avg_loss = losses / p;
    out[period] = rsi_value(avg_gain, avg_loss);
    for i in period + 1..data.len() {
        let diff = data[i] - data[i - 1];
        let (g, l) = if diff >= 0.0 { (diff, 0.0) } else { (0.0, -diff) };
        avg_gain = (avg_gain * (p - 1.0) + g) / p;
        avg_loss = (avg_loss * (p - 1.0) + l) / p;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 { 50.0 } else { 100.0 }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Commodity Channel Index over the typical price.
pub fn cci(period: usize, high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = close.len().min(high.len()).min(low.len());
    let mut out = vec![f64::NAN; close.len()];
    if period == 0 || n < period {
        return out;
    }
    let typical: Vec<f64> = (0..n).map(|i| (high[i] + low[i] + close[i]) / 3.0).collect();
    for end in period..=n {
        let w = &typical[end - period..end];
        let mean = w.iter().sum::<f64>() / period as f64;
        let mean_dev = w.iter().map(|v| (v - mean).abs()).sum::<f64>() / period as f64;
        out[end - 1] = if mean_dev == 0.0 {
            0.0
        } else {
            (typical[end - 1] - mean) / (0.015 * mean_dev)
        };
    }
    out
}

/// Aroon up/down: how recently (in % of the period) the window made its high/low.
pub fn aroon(period: usize, high: &[f64], low: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = high.len().min(low.len());
    let mut up = vec![f64::NAN; n];
    let mut down = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return (up, down);
    }
    for i in period..n {
        let start = i - period;
        let mut hi_idx = start;
        let mut lo_idx = start;
        for j in start..=i {
            if high[j] >= high[hi_idx] {
                hi_idx = j;
            }
            if low[j] <= low[lo_idx] {
                lo_idx = j;
            }
        }
        up[i] = (period - (i - hi_idx)) as f64 / period as f64 * 100.0;
        down[i] = (period - (i - lo_idx)) as f64 / period as f64 * 100.0;
    }
    (up, down)
}

pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(fast: usize, slow: usize, signal: usize, data: &[f64]) -> Macd {
    let fast_ema = ema(fast, data);
    let slow_ema = ema(slow, data);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();

    // Signal line is an EMA over the defined part of the MACD line
    let first = line.iter().position(|v| !v.is_nan()).unwrap_or(line.len());
    let mut signal_line = vec![f64::NAN; line.len()];
    let tail = ema(signal, &line[first..]);
    signal_line[first..].copy_from_slice(&tail);

    let histogram = line.iter().zip(&signal_line).map(|(m, s)| m - s).collect();
    Macd {
        line,
        signal: signal_line,
        histogram,
    }
}

/// Last defined value of an aligned series
pub fn last_defined(series: &[f64]) -> Option<f64> {
    series.last().copied().filter(|v| !v.is_nan())
}
