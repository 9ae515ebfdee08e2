mod maths_utils;
mod perf;
mod time_utils;

pub use time_utils::{
    AppInstant, MS_IN_D, MS_IN_S, MarketClock, epoch_ms_to_date_string, format_duration,
};

pub(crate) use maths_utils::{linear_slope, mean_and_stddev, pct_change};
