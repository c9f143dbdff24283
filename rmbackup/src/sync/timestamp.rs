use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("invalid timestamp {value:?}: {source}")]
    Parse {
        value: String,
        #[source]
        source: time::error::Parse,
    },
    #[error("timestamp {value:?} is out of range in UTC: {source}")]
    OutOfRange {
        value: String,
        #[source]
        source: time::error::ComponentRange,
    },
}

/// A wall-clock instant in UTC as the tablet reports it, e.g.
/// `2023-06-01T06:51:07.837837Z`.
///
/// Ordering compares the calendar components from year down to the
/// sub-second part, which is all the staleness check needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    nanosecond: u32,
}

impl Timestamp {
    pub fn parse(value: &str) -> Result<Self, TimestampError> {
        let parsed =
            OffsetDateTime::parse(value, &Rfc3339).map_err(|source| TimestampError::Parse {
                value: value.to_string(),
                source,
            })?;
        let utc = OffsetDateTime::from_unix_timestamp_nanos(parsed.unix_timestamp_nanos())
            .map_err(|source| TimestampError::OutOfRange {
                value: value.to_string(),
                source,
            })?;
        Ok(Self::from_utc(utc))
    }

    /// Converts a filesystem time. `None` when it cannot be represented.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        let nanos = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => i128::try_from(after.as_nanos()).ok()?,
            Err(before) => -i128::try_from(before.duration().as_nanos()).ok()?,
        };
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()
            .map(Self::from_utc)
    }

    fn from_utc(value: OffsetDateTime) -> Self {
        Self {
            year: value.year(),
            month: u8::from(value.month()),
            day: value.day(),
            hour: value.hour(),
            minute: value.minute(),
            second: value.second(),
            nanosecond: value.nanosecond(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:06}Z",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.nanosecond / 1_000
        )
    }
}
