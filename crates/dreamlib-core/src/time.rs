//! Time helpers shared by the store, catalog and analytics.
//!
//! All calendar arithmetic is done in UTC.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};

/// Milliseconds per day.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Current time as unix milliseconds.
pub fn unix_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Whole days elapsed from `from` to `to`, rounded down.
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds().div_euclid(DAY_MS)
}

/// `YYYY-MM-DD` for the UTC calendar day containing `at`.
pub fn date_string(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// `YYYY-MM` for the UTC calendar month containing `at`.
pub fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// Midnight UTC of the day containing `at`.
pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&at.date_naive().and_time(NaiveTime::MIN))
}

/// Midnight UTC of the Monday starting the week containing `at`.
pub fn start_of_week(at: DateTime<Utc>) -> DateTime<Utc> {
    let offset = i64::from(at.weekday().num_days_from_monday());
    start_of_day(at) - Duration::days(offset)
}

/// Whether `at` lies in the half-open window `[start, end)`.
pub fn within(at: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    at >= start && at < end
}
