use chrono::{DateTime, Duration, TimeZone, Utc};

const MAX_HOURS: u64 = 1_000_000;

/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Converts Unix milliseconds to a UTC datetime, `None` when out of range.
pub fn datetime_from_unix_ms(unix_ms: u64) -> Option<DateTime<Utc>> {
    let unix_ms = i64::try_from(unix_ms).ok()?;
    Utc.timestamp_millis_opt(unix_ms).single()
}

/// Whole-hour duration, clamped to a range chrono can represent.
pub fn hours_duration(hours: u64) -> Duration {
    Duration::hours(i64::try_from(hours.min(MAX_HOURS)).unwrap_or(0))
}

/// Returns `now` moved back by `hours` whole hours.
pub fn hours_before(now: DateTime<Utc>, hours: u64) -> DateTime<Utc> {
    now.checked_sub_signed(hours_duration(hours))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
