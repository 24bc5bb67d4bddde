use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use tracing::{instrument, trace};

use crate::daemon::storage::entities::{Measurement, MeasurementKind};

/// Gaps between two measurements of at least this length are considered a break.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::minutes(10);

/// Which ends of a day were set by a manual correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Highlights {
    pub start: bool,
    pub end: bool,
}

/// Summary of work for a single calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySegment {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Time between measurements, minus gaps longer than the idle threshold.
    pub work: Duration,
    pub highlights: Highlights,
    /// The previous segment belongs to a different ISO week.
    pub new_week: bool,
}

/// Day under construction during segmentation.
struct OpenDay {
    date: NaiveDate,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    work: Duration,
    highlights: Highlights,
    /// Set by a manual stop. Everything later on the same day is ignored.
    frozen: bool,
}

impl OpenDay {
    /// A new day is never frozen, whatever kind of measurement opens it.
    fn open(measurement: &Measurement, date: NaiveDate) -> Self {
        Self {
            date,
            start: measurement.timestamp,
            end: measurement.timestamp,
            work: Duration::zero(),
            highlights: Highlights {
                start: measurement.kind == MeasurementKind::ManualMark,
                end: false,
            },
            frozen: false,
        }
    }

    fn extend(&mut self, measurement: &Measurement, idle_threshold: Duration) {
        if self.frozen {
            trace!("Ignoring {measurement:?} after a manual stop");
            return;
        }

        let gap = measurement.timestamp - self.end;
        if gap < idle_threshold {
            self.work += gap;
        }
        self.end = measurement.timestamp;

        if measurement.kind == MeasurementKind::ManualStop {
            self.highlights.end = true;
            self.frozen = true;
        }
    }

    fn close(self, previous: Option<&DaySegment>) -> DaySegment {
        DaySegment {
            date: self.date,
            start: self.start,
            end: self.end,
            work: self.work,
            highlights: self.highlights,
            new_week: previous
                .is_some_and(|previous| previous.date.iso_week() != self.date.iso_week()),
        }
    }
}

/// Splits measurements into calendar days of `timezone` and sums up the work done on each.
///
/// `measurements` must be sorted by timestamp. Long gaps inside a day are excluded from work but
/// never split the day.
#[instrument(skip_all, fields(measurements = measurements.len()))]
pub fn segment_days<Tz: TimeZone>(
    measurements: &[Measurement],
    idle_threshold: Duration,
    timezone: &Tz,
) -> Vec<DaySegment> {
    let date_of = |measurement: &Measurement| {
        measurement
            .timestamp
            .with_timezone(timezone)
            .date_naive()
    };

    let Some((first, rest)) = measurements.split_first() else {
        return vec![];
    };

    let mut days: Vec<DaySegment> = vec![];
    let mut current = OpenDay::open(first, date_of(first));

    for measurement in rest {
        let date = date_of(measurement);
        if date != current.date {
            let closed = std::mem::replace(&mut current, OpenDay::open(measurement, date));
            let segment = closed.close(days.last());
            trace!("Closed day {segment:?}");
            days.push(segment);
        } else {
            current.extend(measurement, idle_threshold);
        }
    }

    let segment = current.close(days.last());
    days.push(segment);
    days
}
