use chrono::{DateTime, Duration, Utc};

/// This is the standard way of converting a chunk creation time to a file name in flextime.
/// Colons are avoided so the names stay valid on every platform.
pub fn datetime_to_chunk_name(moment: DateTime<Utc>) -> String {
    moment.format("%Y-%m-%dT%H-%M-%SZ").to_string()
}

/// Returns the first multiple of `interval` since the epoch that lies strictly after `moment`.
/// With a one minute interval this is the start of the next clock minute.
pub fn next_tick_boundary(moment: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = interval.num_milliseconds().max(1);
    let next = (moment.timestamp_millis().div_euclid(step) + 1) * step;
    DateTime::from_timestamp_millis(next).unwrap_or(moment + interval)
}
