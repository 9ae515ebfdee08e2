use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};

use crate::config::constants::session;

pub type AppInstant = std::time::Instant;

pub const MS_IN_S: i64 = 1000;
pub const MS_IN_MIN: i64 = MS_IN_S * 60;
pub const MS_IN_H: i64 = MS_IN_MIN * 60;
pub const MS_IN_D: i64 = MS_IN_H * 24;

const STANDARD_TIME_FORMAT: &str = "%Y-%m-%d";

/// Decides whether the exchange session is currently live.
/// A live market means cached datasets are stale, so workers always refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketClock {
    /// Use the NSE session calendar against the wall clock
    Exchange,
    /// Fixed answer (tests, offline replays)
    Fixed(bool),
}

impl MarketClock {
    pub fn is_open(&self) -> bool {
        match self {
            MarketClock::Fixed(open) => *open,
            MarketClock::Exchange => is_session_open(Utc::now()),
        }
    }
}

pub(crate) fn is_session_open(now: DateTime<Utc>) -> bool {
    let Some(ist) = FixedOffset::east_opt(session::UTC_OFFSET_SECS) else {
        return false;
    };
    let local = now.with_timezone(&ist);
    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    let (Some(open), Some(close)) = (
        NaiveTime::from_hms_opt(session::OPEN.0, session::OPEN.1, 0),
        NaiveTime::from_hms_opt(session::CLOSE.0, session::CLOSE.1, 0),
    ) else {
        return false;
    };
    let t = local.time();
    t >= open && t <= close
}

pub fn epoch_ms_to_date_string(epoch_ms: i64) -> String {
    // Used for display purposes
    match DateTime::from_timestamp_millis(epoch_ms) {
        Some(dt) => dt.format(STANDARD_TIME_FORMAT).to_string(),
        None => "n/a".to_string(),
    }
}

pub fn format_duration(ms: i64) -> String {
    let secs = ms / 1000;
    if secs < 60 {
        return format!("{}s", secs);
    }
    let mins = secs / 60;
    if mins < 60 {
        return format!("{}m {}s", mins, secs % 60);
    }
    let hours = mins / 60;
    if hours < 24 {
        return format!("{}h {}m", hours, mins % 60);
    }
    format!("{}d {}h", hours / 24, hours % 24)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn session_hours_in_ist() {
        // Wednesday 2024-01-10 04:00 UTC = 09:30 IST
        let open = Utc.with_ymd_and_hms(2024, 1, 10, 4, 0, 0).unwrap();
        assert!(is_session_open(open));
        // Wednesday 2024-01-10 11:00 UTC = 16:30 IST
        let closed = Utc.with_ymd_and_hms(2024, 1, 10, 11, 0, 0).unwrap();
        assert!(!is_session_open(closed));
        // Saturday
        let weekend = Utc.with_ymd_and_hms(2024, 1, 13, 5, 0, 0).unwrap();
        assert!(!is_session_open(weekend));
    }

    #[test]
    fn durations_are_compact() {
        assert_eq!(format_duration(42_000), "42s");
        assert_eq!(format_duration(125_000), "2m 5s");
        assert_eq!(format_duration(5 * MS_IN_H + 3 * MS_IN_MIN), "5h 3m");
    }

    #[test]
    fn dates_format_as_iso() {
        assert_eq!(epoch_ms_to_date_string(0), "1970-01-01");
    }
}
