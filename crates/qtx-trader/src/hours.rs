//! Market-hours gate: Monday-Friday, 09:30-16:00 exchange-local time.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;

/// `now` is in UTC; converted to exchange-local time for the check.
pub fn is_market_hours(now: DateTime<Utc>) -> bool {
    let local = now.with_timezone(&New_York);

    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }

    let minutes = local.hour() * 60 + local.minute();
    let open = 9 * 60 + 30;
    let close = 16 * 60;
    (open..close).contains(&minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn weekday_during_session_is_open() {
        // 2026-01-05 is a Monday; 14:30 UTC = 09:30 New York (EST, UTC-5).
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 14, 30, 0).unwrap();
        assert!(is_market_hours(now));
    }

    #[test]
    fn weekday_before_open_is_closed() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 13, 0, 0).unwrap();
        assert!(!is_market_hours(now));
    }

    #[test]
    fn weekday_after_close_is_closed() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 21, 1, 0).unwrap();
        assert!(!is_market_hours(now));
    }

    #[test]
    fn weekend_is_always_closed() {
        let now = Utc.with_ymd_and_hms(2026, 1, 3, 15, 0, 0).unwrap();
        assert!(!is_market_hours(now));
    }
}
