//! Multi-epoch timestamp assembly.
//!
//! Vendor formats deliver date/time components in every imaginable order
//! and range: 2-digit years, day counts since a vendor-chosen epoch, raw
//! Unix offsets. [`DateBuilder`] collects components in any call order and
//! validates the assembled date loudly — a month of 0 or 13 is an error,
//! never a wraparound, because several vendor firmwares rely on accidental
//! wrapping and that behavior is a bug to fix, not a contract to keep.

use chrono::{
    DateTime,
    Duration,
    TimeZone,
    Utc,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("no date components supplied")]
    Empty,

    #[error("nonsensical date: {year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")]
    InvalidDate {
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    },

    #[error("offset {0} out of range for epoch")]
    EpochOverflow(u64),
}

/// Reference epochs used by the supported vendor formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Epoch {
    /// 1970-01-01, plain Unix offset.
    Unix,
    /// 1980-01-06, the GPS week epoch.
    Gps,
    /// 2008-01-01.
    Y2008,
    /// 2010-01-01.
    Y2010,
}

impl Epoch {
    fn base(&self) -> DateTime<Utc> {
        let (year, month, day) = match self {
            Self::Unix => (1970, 1, 1),
            Self::Gps => (1980, 1, 6),
            Self::Y2008 => (2008, 1, 1),
            Self::Y2010 => (2010, 1, 1),
        };
        // all four bases are valid calendar dates
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
    }

    /// Timestamp at `seconds` past this epoch.
    pub fn plus_seconds(&self, seconds: u64) -> Result<DateTime<Utc>, TimeError> {
        let seconds = i64::try_from(seconds).map_err(|_| TimeError::EpochOverflow(seconds))?;
        self.base()
            .checked_add_signed(Duration::seconds(seconds))
            .ok_or(TimeError::EpochOverflow(seconds as u64))
    }

    /// Timestamp at `days` and `seconds_of_day` past this epoch.
    pub fn plus_days(&self, days: u32, seconds_of_day: u32) -> Result<DateTime<Utc>, TimeError> {
        let seconds = u64::from(days) * 86_400 + u64::from(seconds_of_day);
        self.plus_seconds(seconds)
    }
}

/// Assembles a timestamp from components supplied in any call order.
///
/// Missing time-of-day components default to zero; a missing date is an
/// error. Validation happens once, in [`build`][Self::build].
#[derive(Clone, Copy, Debug, Default)]
pub struct DateBuilder {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    hour: u32,
    minute: u32,
    second: u32,
    offset_seconds: i64,
}

impl DateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the year. Values below 100 are 2-digit years meaning `2000 + y`.
    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(if year < 100 { 2000 + year } else { year });
        self
    }

    pub fn month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    pub fn day(mut self, day: u32) -> Self {
        self.day = Some(day);
        self
    }

    pub fn date(self, year: i32, month: u32, day: u32) -> Self {
        self.year(year).month(month).day(day)
    }

    pub fn time(mut self, hour: u32, minute: u32, second: u32) -> Self {
        self.hour = hour;
        self.minute = minute;
        self.second = second;
        self
    }

    /// Shifts the assembled timestamp by `-seconds`, for devices that
    /// report local time with a configured timezone offset.
    pub fn timezone_offset(mut self, seconds: i64) -> Self {
        self.offset_seconds = seconds;
        self
    }

    pub fn build(self) -> Result<DateTime<Utc>, TimeError> {
        let (Some(year), Some(month), Some(day)) = (self.year, self.month, self.day) else {
            return Err(TimeError::Empty);
        };

        let invalid = || {
            TimeError::InvalidDate {
                year,
                month,
                day,
                hour: self.hour,
                minute: self.minute,
                second: self.second,
            }
        };

        let timestamp = Utc
            .with_ymd_and_hms(year, month, day, self.hour, self.minute, self.second)
            .single()
            .ok_or_else(invalid)?;

        timestamp
            .checked_sub_signed(Duration::seconds(self.offset_seconds))
            .ok_or_else(invalid)
    }
}
