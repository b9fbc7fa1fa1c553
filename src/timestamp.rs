//! Wall-clock timestamps in the logger's fixed text form.
//!
//! The text form is `MM-DD-YYYYThh:mm:ss±offset`, where the offset is in
//! whole minutes and has no padding (`+0`, `-300`). The all-zero value
//! `00-00-0000T00:00:00+0` stands for "time unknown".
//!
//! Equality, ordering and hashing go through [`Timestamp::epoch_seconds`],
//! so two timestamps naming the same instant in different offsets compare
//! equal. The unknown timestamp sorts before every real one.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

/// Years that survive the four-digit text form.
const YEARS: RangeInclusive<i32> = 0..=9999;

/// Error types for timestamp construction and arithmetic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimeError {
    /// Neither a network clock nor a cached anchor is available
    #[error("No time reference available")]
    NoReferenceAvailable,
    /// Text that is not in `MM-DD-YYYYThh:mm:ss±offset` form
    #[error("Invalid timestamp '{0}'")]
    Parse(String),
    /// Fields that do not name a real calendar instant
    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

impl From<time::error::ComponentRange> for TimeError {
    fn from(err: time::error::ComponentRange) -> Self {
        TimeError::InvalidDate(err.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    offset_minutes: i32,
}

impl Timestamp {
    /// The "time unknown" sentinel.
    pub const UNKNOWN: Timestamp = Timestamp {
        year: 0,
        month: 0,
        day: 0,
        hour: 0,
        minute: 0,
        second: 0,
        offset_minutes: 0,
    };

    /// Build a validated timestamp. `offset_minutes` is the local offset
    /// from UTC and `year` must fit in four digits.
    pub fn new(
        year: i32,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        offset_minutes: i32,
    ) -> Result<Self, TimeError> {
        Timestamp {
            year,
            month,
            day,
            hour,
            minute,
            second,
            offset_minutes,
        }
        .validated()
    }

    /// Local time at `offset_minutes` for a Unix epoch second.
    pub fn from_epoch(epoch_seconds: i64, offset_minutes: i32) -> Result<Self, TimeError> {
        let offset = utc_offset(offset_minutes)?;
        let dt = OffsetDateTime::from_unix_timestamp(epoch_seconds)?.to_offset(offset);
        Self::from_parts(dt.date(), dt.time(), offset_minutes).validated()
    }

    fn from_parts(date: Date, time: Time, offset_minutes: i32) -> Self {
        Timestamp {
            year: date.year(),
            month: u8::from(date.month()),
            day: date.day(),
            hour: time.hour(),
            minute: time.minute(),
            second: time.second(),
            offset_minutes,
        }
    }

    fn validated(self) -> Result<Self, TimeError> {
        if !YEARS.contains(&self.year) {
            return Err(TimeError::InvalidDate(format!("year {}", self.year)));
        }
        self.to_offset_datetime()?;
        Ok(self)
    }

    fn to_primitive(self) -> Result<PrimitiveDateTime, TimeError> {
        let month = Month::try_from(self.month)?;
        let date = Date::from_calendar_date(self.year, month, self.day)?;
        let time = Time::from_hms(self.hour, self.minute, self.second)?;
        Ok(PrimitiveDateTime::new(date, time))
    }

    fn to_offset_datetime(self) -> Result<OffsetDateTime, TimeError> {
        Ok(self
            .to_primitive()?
            .assume_offset(utc_offset(self.offset_minutes)?))
    }

    pub fn is_unknown(&self) -> bool {
        self.year == 0
            && self.month == 0
            && self.day == 0
            && self.hour == 0
            && self.minute == 0
            && self.second == 0
            && self.offset_minutes == 0
    }

    /// Seconds since the Unix epoch, or `None` for the unknown timestamp.
    pub fn epoch_seconds(&self) -> Option<i64> {
        if self.is_unknown() {
            return None;
        }
        self.to_offset_datetime().ok().map(|dt| dt.unix_timestamp())
    }

    /// Shift by whole minutes, carrying through hours, days, months and
    /// years. The offset is kept.
    pub fn add_minutes(&self, minutes: i64) -> Result<Self, TimeError> {
        if self.is_unknown() {
            return Err(TimeError::NoReferenceAvailable);
        }
        let shifted = self
            .to_primitive()?
            .checked_add(Duration::minutes(minutes))
            .ok_or_else(|| TimeError::InvalidDate(format!("{self} + {minutes} min")))?;
        Self::from_parts(shifted.date(), shifted.time(), self.offset_minutes).validated()
    }

    /// Parse the text form. Field widths are not enforced and the offset
    /// may be omitted.
    ///
    /// # Example
    /// ```
    /// use datagator::timestamp::Timestamp;
    ///
    /// let ts = Timestamp::parse("03-07-2024T09:05:00-300").unwrap();
    /// assert_eq!(ts.to_string(), "03-07-2024T09:05:00-300");
    /// assert!(Timestamp::parse("00-00-0000T00:00:00+0").unwrap().is_unknown());
    /// ```
    pub fn parse(text: &str) -> Result<Self, TimeError> {
        let invalid = || TimeError::Parse(text.to_string());
        let number = |s: &str| s.trim().parse::<u8>().map_err(|_| invalid());

        let (date, clock) = text.trim().split_once('T').ok_or_else(invalid)?;

        let mut date_parts = date.split('-');
        let (Some(month), Some(day), Some(year), None) = (
            date_parts.next(),
            date_parts.next(),
            date_parts.next(),
            date_parts.next(),
        ) else {
            return Err(invalid());
        };

        let (clock, offset_minutes) = match clock.find(['+', '-']) {
            Some(at) => {
                let offset = clock[at..].parse::<i32>().map_err(|_| invalid())?;
                (&clock[..at], offset)
            }
            None => (clock, 0),
        };

        let mut clock_parts = clock.split(':');
        let (Some(hour), Some(minute), Some(second), None) = (
            clock_parts.next(),
            clock_parts.next(),
            clock_parts.next(),
            clock_parts.next(),
        ) else {
            return Err(invalid());
        };

        let ts = Timestamp {
            year: year.trim().parse().map_err(|_| invalid())?,
            month: number(month)?,
            day: number(day)?,
            hour: number(hour)?,
            minute: number(minute)?,
            second: number(second)?,
            offset_minutes,
        };
        if ts.is_unknown() {
            return Ok(ts);
        }
        ts.validated()
    }

    /// Text form, identical to `Display`.
    pub fn format(&self) -> String {
        self.to_string()
    }

    /// Stem of the daily log file this timestamp belongs to.
    pub fn log_file_stem(&self) -> String {
        if self.is_unknown() {
            "log".to_string()
        } else {
            format!("log_{}-{}-{}", self.month, self.day, self.year)
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

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn second(&self) -> u8 {
        self.second
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset_minutes
    }
}

fn utc_offset(minutes: i32) -> Result<UtcOffset, TimeError> {
    let seconds = minutes
        .checked_mul(60)
        .ok_or_else(|| TimeError::InvalidDate(format!("offset {minutes} min")))?;
    Ok(UtcOffset::from_whole_seconds(seconds)?)
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::UNKNOWN
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        write!(
            f,
            "{:02}-{:02}-{:04}T{:02}:{:02}:{:02}{sign}{}",
            self.month,
            self.day,
            self.year,
            self.hour,
            self.minute,
            self.second,
            self.offset_minutes.unsigned_abs()
        )
    }
}

impl FromStr for Timestamp {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timestamp::parse(s)
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.epoch_seconds() == other.epoch_seconds()
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch_seconds().cmp(&other.epoch_seconds())
    }
}

impl Hash for Timestamp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch_seconds().hash(state);
    }
}
