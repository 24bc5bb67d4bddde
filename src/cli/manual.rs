use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_english::{parse_date_string, Dialect};

use crate::daemon::storage::entities::{Measurement, MeasurementKind};

const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

/// Parses a wall clock time given by the user in the timezone of `now`.
///
/// Strict formats are tried first, a bare time refers to the day of `now`. Anything else is
/// handed to chrono-english, so "1 hour ago" works as well.
pub fn parse_wall_clock<Tz: TimeZone>(
    value: &str,
    now: &DateTime<Tz>,
    dialect: Dialect,
) -> Result<DateTime<Utc>>
where
    Tz::Offset: Copy,
{
    let value = value.trim();
    let timezone = now.timezone();

    let naive = DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            TIME_FORMATS
                .iter()
                .find_map(|format| NaiveTime::parse_from_str(value, format).ok())
                .map(|time| now.date_naive().and_time(time))
        });

    if let Some(naive) = naive {
        // Ambiguous times during a DST switch resolve to the first occurrence.
        return timezone
            .from_local_datetime(&naive)
            .earliest()
            .map(|time| time.to_utc())
            .ok_or_else(|| anyhow!("{value} doesn't exist in the local timezone"));
    }

    parse_date_string(value, now.clone(), dialect)
        .map(|time| time.to_utc())
        .map_err(|e| anyhow!("Can't understand time {value:?}: {e}"))
}

/// Turns the user's corrections into measurements that can be merged with the recorded ones.
/// Fails on the first correction that can't be parsed.
pub fn injected_measurements<Tz: TimeZone>(
    stops: &[String],
    marks: &[String],
    now: &DateTime<Tz>,
    dialect: Dialect,
) -> Result<Vec<Measurement>>
where
    Tz::Offset: Copy,
{
    let stops = stops
        .iter()
        .map(|value| (value, MeasurementKind::ManualStop));
    let marks = marks
        .iter()
        .map(|value| (value, MeasurementKind::ManualMark));

    stops
        .chain(marks)
        .map(|(value, kind)| {
            parse_wall_clock(value, now, dialect).map(|time| Measurement::manual(time, kind))
        })
        .collect()
}
