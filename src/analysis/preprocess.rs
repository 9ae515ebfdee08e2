//! Processed view: indicators computed over the whole training history, then
//! trimmed to the lookback window.

use crate::analysis::indicators::{self, moving_average};
use crate::config::constants::indicators as periods;
use crate::models::OhlcvTimeSeries;

pub struct ProcessedView {
    /// Last `days_to_lookback` rows of the training view
    pub series: OhlcvTimeSeries,
    pub ma_short: Vec<f64>,
    pub ma_mid: Vec<f64>,
    pub ma_long: Vec<f64>,
    /// Average over the item's own MA length
    pub ma_custom: Vec<f64>,
    pub rsi: Vec<f64>,
    pub cci: Vec<f64>,
    pub volume_avg: Vec<f64>,
}

impl ProcessedView {
    pub fn len(&self) -> usize {
        self.series.klines()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

pub fn preprocess(
    training: &OhlcvTimeSeries,
    days_to_lookback: usize,
    ma_length: usize,
    use_ema: bool,
) -> ProcessedView {
    let close = &training.close_prices;
    let keep = days_to_lookback.min(training.klines());
    let trim = |v: Vec<f64>| -> Vec<f64> { v[v.len() - keep..].to_vec() };

    ProcessedView {
        series: training.tail(keep),
        ma_short: trim(moving_average(periods::MA_SHORT, close, use_ema)),
        ma_mid: trim(moving_average(periods::MA_MID, close, use_ema)),
        ma_long: trim(moving_average(periods::MA_LONG, close, use_ema)),
        ma_custom: trim(moving_average(ma_length.max(1), close, use_ema)),
        rsi: trim(indicators::rsi(periods::RSI_PERIOD, close)),
        cci: trim(indicators::cci(
            periods::CCI_PERIOD,
            &training.high_prices,
            &training.low_prices,
            close,
        )),
        volume_avg: trim(indicators::sma(
            periods::VOLUME_AVERAGE_WINDOW,
            &training.volumes,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_utils::series_from_closes;

    #[test]
    fn indicators_use_history_before_the_window() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let training = series_from_closes("X", &closes, 10.0);
        let view = preprocess(&training, 10, 7, false);

        assert_eq!(view.len(), 10);
        assert_eq!(view.ma_short.len(), 10);
        // A 20-period SMA is defined on every row of the window because the
        // full history was used to compute it.
        assert!(view.ma_short.iter().all(|v| !v.is_nan()));
        assert_eq!(view.ma_short[9], (140..160).map(|i| i as f64).sum::<f64>() / 20.0);
        assert!(view.ma_long.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn short_history_is_not_padded() {
        let training = series_from_closes("X", &[10.0, 11.0, 12.0], 1.0);
        let view = preprocess(&training, 30, 7, true);
        assert_eq!(view.len(), 3);
        assert_eq!(view.rsi.len(), 3);
    }
}
