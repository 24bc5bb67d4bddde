use chrono::DateTime;
use chrono::Utc;

use serde::Deserialize;
use serde::Serialize;

/// What a [Measurement] stands for. Decoded from the numeric code stored on disk exactly once, so
/// nothing downstream ever compares raw codes.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(from = "u32", into = "u32")]
pub enum MeasurementKind {
    /// A regular observation made by the sampler.
    #[default]
    Sample,
    /// User correction: the day's work ended here.
    ManualStop,
    /// User correction: a day's work started here.
    ManualMark,
    /// A code written by a newer version. Kept as is so it survives a rewrite.
    Unrecognized(u32),
}

const SAMPLE_CODE: u32 = 0;
const MANUAL_STOP_CODE: u32 = 1;
const MANUAL_MARK_CODE: u32 = 2;

impl From<u32> for MeasurementKind {
    fn from(value: u32) -> Self {
        match value {
            SAMPLE_CODE => Self::Sample,
            MANUAL_STOP_CODE => Self::ManualStop,
            MANUAL_MARK_CODE => Self::ManualMark,
            other => Self::Unrecognized(other),
        }
    }
}

impl From<MeasurementKind> for u32 {
    fn from(value: MeasurementKind) -> Self {
        match value {
            MeasurementKind::Sample => SAMPLE_CODE,
            MeasurementKind::ManualStop => MANUAL_STOP_CODE,
            MeasurementKind::ManualMark => MANUAL_MARK_CODE,
            MeasurementKind::Unrecognized(code) => code,
        }
    }
}

/// Represents a single observation of user presence at a certain point in time.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct Measurement {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    /// Seconds since the last input event. Only meaningful for [MeasurementKind::Sample].
    #[serde(rename = "idle", default)]
    pub idle_seconds: u32,
    #[serde(default)]
    pub kind: MeasurementKind,
}

impl Measurement {
    pub fn sample(timestamp: DateTime<Utc>, idle_seconds: u32) -> Self {
        Self {
            timestamp,
            idle_seconds,
            kind: MeasurementKind::Sample,
        }
    }

    pub fn manual(timestamp: DateTime<Utc>, kind: MeasurementKind) -> Self {
        Self {
            timestamp,
            idle_seconds: 0,
            kind,
        }
    }
}

/// The unit written to a chunk file. Every flush rewrites the whole batch.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct Batch {
    /// Sampling interval in seconds the daemon was running with.
    #[serde(rename = "interval")]
    pub sampling_interval_seconds: u32,
    /// IANA name of the local timezone at capture time.
    #[serde(rename = "zone")]
    pub timezone_identifier: String,
    #[serde(default)]
    pub measurements: Vec<Measurement>,
}

impl Batch {
    pub fn new(sampling_interval_seconds: u32, timezone_identifier: impl Into<String>) -> Self {
        Self {
            sampling_interval_seconds,
            timezone_identifier: timezone_identifier.into(),
            measurements: vec![],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}
