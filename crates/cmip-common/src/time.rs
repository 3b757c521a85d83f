//! CF-style time units on model calendars.
//!
//! Climate models rarely use the civil calendar: E3SM runs on `noleap`, some
//! components on `360_day`. Every date here is converted through a day
//! ordinal counted from 0001-01-01 on the given calendar, which makes
//! encoding and decoding symmetric for all calendars.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::TimeError;

const SECONDS_PER_DAY: f64 = 86_400.0;

const CUM_DAYS_365: [u32; 13] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334, 365];
const CUM_DAYS_366: [u32; 13] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335, 366];

/// Model calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Calendar {
    /// Treated as proleptic Gregorian; no Julian switch-over.
    Standard,
    ProlepticGregorian,
    #[default]
    NoLeap,
    AllLeap,
    Day360,
}

impl Calendar {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::ProlepticGregorian => "proleptic_gregorian",
            Self::NoLeap => "noleap",
            Self::AllLeap => "all_leap",
            Self::Day360 => "360_day",
        }
    }

    fn days_in_month(&self, year: i32, month: u32) -> u32 {
        match self {
            Self::Day360 => 30,
            Self::NoLeap => CUM_DAYS_365[month as usize] - CUM_DAYS_365[month as usize - 1],
            Self::AllLeap => CUM_DAYS_366[month as usize] - CUM_DAYS_366[month as usize - 1],
            Self::Standard | Self::ProlepticGregorian => {
                let next = if month == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1)
                };
                match (NaiveDate::from_ymd_opt(year, month, 1), next) {
                    (Some(start), Some(end)) => (end - start).num_days() as u32,
                    _ => 0,
                }
            }
        }
    }

    /// Days since 0001-01-01 on this calendar.
    fn ordinal(&self, year: i32, month: u32, day: u32) -> Result<i64, TimeError> {
        if !(1..=12).contains(&month) || day == 0 || day > self.days_in_month(year, month) {
            return Err(TimeError::InvalidTimestamp(format!(
                "{year:04}-{month:02}-{day:02} ({})",
                self.as_str()
            )));
        }
        let y = i64::from(year) - 1;
        let m = month as usize - 1;
        let d = i64::from(day) - 1;
        let ordinal = match self {
            Self::NoLeap => y * 365 + i64::from(CUM_DAYS_365[m]) + d,
            Self::AllLeap => y * 366 + i64::from(CUM_DAYS_366[m]) + d,
            Self::Day360 => y * 360 + (m as i64) * 30 + d,
            Self::Standard | Self::ProlepticGregorian => {
                let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
                    TimeError::InvalidTimestamp(format!("{year:04}-{month:02}-{day:02}"))
                })?;
                i64::from(date.num_days_from_ce()) - 1
            }
        };
        Ok(ordinal)
    }

    /// Inverse of [`Calendar::ordinal`].
    fn from_ordinal(&self, ordinal: i64) -> Result<(i32, u32, u32), TimeError> {
        let fixed = |days_per_year: i64, cum: &[u32; 13]| {
            let year = ordinal.div_euclid(days_per_year) + 1;
            let doy = ordinal.rem_euclid(days_per_year) as u32;
            let month = (1..=12).find(|&m| doy < cum[m]).unwrap_or(12);
            (year as i32, month as u32, doy - cum[month - 1] + 1)
        };
        match self {
            Self::NoLeap => Ok(fixed(365, &CUM_DAYS_365)),
            Self::AllLeap => Ok(fixed(366, &CUM_DAYS_366)),
            Self::Day360 => {
                let year = ordinal.div_euclid(360) + 1;
                let doy = ordinal.rem_euclid(360) as u32;
                Ok((year as i32, doy / 30 + 1, doy % 30 + 1))
            }
            Self::Standard | Self::ProlepticGregorian => {
                let days = i32::try_from(ordinal + 1)
                    .map_err(|_| TimeError::InvalidTimestamp(format!("day ordinal {ordinal}")))?;
                let date = NaiveDate::from_num_days_from_ce_opt(days)
                    .ok_or_else(|| TimeError::InvalidTimestamp(format!("day ordinal {ordinal}")))?;
                Ok((date.year(), date.month(), date.day()))
            }
        }
    }
}

impl FromStr for Calendar {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" | "gregorian" => Ok(Self::Standard),
            "proleptic_gregorian" => Ok(Self::ProlepticGregorian),
            "noleap" | "no_leap" | "365_day" => Ok(Self::NoLeap),
            "all_leap" | "366_day" => Ok(Self::AllLeap),
            "360_day" => Ok(Self::Day360),
            other => Err(TimeError::UnsupportedCalendar(other.to_string())),
        }
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A date-time on some model calendar. Validity depends on the calendar,
/// so construction goes through [`CalendarDate::new`] or a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CalendarDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl CalendarDate {
    pub fn new(year: i32, month: u32, day: u32, calendar: Calendar) -> Result<Self, TimeError> {
        calendar.ordinal(year, month, day)?;
        Ok(Self {
            year,
            month,
            day,
            hour: 0,
            minute: 0,
            second: 0,
        })
    }

    pub fn with_time(mut self, hour: u32, minute: u32, second: u32) -> Result<Self, TimeError> {
        if hour > 23 || minute > 59 || second > 59 {
            return Err(TimeError::InvalidTimestamp(format!(
                "{hour:02}:{minute:02}:{second:02}"
            )));
        }
        self.hour = hour;
        self.minute = minute;
        self.second = second;
        Ok(self)
    }

    /// Parse `YYYY-MM-DD[( |_|T)hh[:mm[:ss]]]`.
    ///
    /// Accepts MPAS `xtime` strings (`0001-01-01_00:00:00`, often padded
    /// with blanks or NULs) as well as the reference date of CF units.
    pub fn parse(text: &str, calendar: Calendar) -> Result<Self, TimeError> {
        let invalid = || TimeError::InvalidTimestamp(text.to_string());
        let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');

        let (date_part, time_part) = match text.find(&['_', ' ', 'T'][..]) {
            Some(i) => (&text[..i], Some(text[i + 1..].trim())),
            None => (text, None),
        };

        let mut fields = date_part.splitn(3, '-');
        let year: i32 = fields.next().and_then(|s| s.parse().ok()).ok_or_else(invalid)?;
        let month: u32 = fields.next().and_then(|s| s.parse().ok()).ok_or_else(invalid)?;
        let day: u32 = fields.next().and_then(|s| s.parse().ok()).ok_or_else(invalid)?;

        let date = Self::new(year, month, day, calendar).map_err(|_| invalid())?;

        match time_part.filter(|t| !t.is_empty()) {
            None => Ok(date),
            Some(t) => {
                let t = t.trim_end_matches('Z');
                let mut hms = t.split(':');
                let hour: u32 = hms.next().and_then(|s| s.parse().ok()).ok_or_else(invalid)?;
                let minute: u32 = hms.next().map_or(Some(0), |s| s.parse().ok()).ok_or_else(invalid)?;
                let second: u32 = hms
                    .next()
                    .map_or(Some(0.0), |s| s.parse::<f64>().ok())
                    .map(|s| s.floor() as u32)
                    .ok_or_else(invalid)?;
                date.with_time(hour, minute, second).map_err(|_| invalid())
            }
        }
    }

    fn seconds_of_day(&self) -> f64 {
        f64::from(self.hour * 3600 + self.minute * 60 + self.second)
    }

    /// Fractional days since 0001-01-01 00:00 on `calendar`.
    pub fn days_since_epoch(&self, calendar: Calendar) -> Result<f64, TimeError> {
        let ordinal = calendar.ordinal(self.year, self.month, self.day)?;
        Ok(ordinal as f64 + self.seconds_of_day() / SECONDS_PER_DAY)
    }

    /// Inverse of [`CalendarDate::days_since_epoch`], rounded to the second.
    pub fn from_days_since_epoch(days: f64, calendar: Calendar) -> Result<Self, TimeError> {
        if !days.is_finite() {
            return Err(TimeError::InvalidTimestamp(days.to_string()));
        }
        let total_seconds = (days * SECONDS_PER_DAY).round() as i64;
        let ordinal = total_seconds.div_euclid(86_400);
        let secs = total_seconds.rem_euclid(86_400) as u32;
        let (year, month, day) = calendar.from_ordinal(ordinal)?;
        Ok(Self {
            year,
            month,
            day,
            hour: secs / 3600,
            minute: (secs % 3600) / 60,
            second: secs % 60,
        })
    }

    /// `YYYY`, `YYYYMM`, `YYYYMMDD`, ... truncated to `digits` characters.
    pub fn compact(&self, digits: usize) -> String {
        let full = format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        );
        full.chars().take(digits).collect()
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeUnit {
    fn per_day(&self) -> f64 {
        match self {
            Self::Days => 1.0,
            Self::Hours => 24.0,
            Self::Minutes => 1440.0,
            Self::Seconds => SECONDS_PER_DAY,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Days => "days",
            Self::Hours => "hours",
            Self::Minutes => "minutes",
            Self::Seconds => "seconds",
        }
    }
}

/// Parsed `"<unit> since <reference>"` on a calendar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub reference: CalendarDate,
    pub calendar: Calendar,
}

impl TimeUnits {
    pub fn new(unit: TimeUnit, reference: CalendarDate, calendar: Calendar) -> Self {
        Self {
            unit,
            reference,
            calendar,
        }
    }

    /// `days since 0001-01-01 00:00:00` on the noleap calendar, the MPAS
    /// monthly-statistics convention.
    pub fn mpas_default() -> Self {
        Self::new(
            TimeUnit::Days,
            CalendarDate {
                year: 1,
                month: 1,
                day: 1,
                hour: 0,
                minute: 0,
                second: 0,
            },
            Calendar::NoLeap,
        )
    }

    pub fn parse(units: &str, calendar: Calendar) -> Result<Self, TimeError> {
        let invalid = || TimeError::InvalidUnits(units.to_string());
        let (unit, reference) = units.split_once(" since ").ok_or_else(invalid)?;

        let unit = match unit.trim().to_lowercase().as_str() {
            "days" | "day" | "d" => TimeUnit::Days,
            "hours" | "hour" | "h" => TimeUnit::Hours,
            "minutes" | "minute" | "min" => TimeUnit::Minutes,
            "seconds" | "second" | "s" => TimeUnit::Seconds,
            _ => return Err(invalid()),
        };

        let reference = CalendarDate::parse(reference, calendar).map_err(|_| invalid())?;
        Ok(Self::new(unit, reference, calendar))
    }

    /// Encode a date as a value in these units.
    pub fn encode(&self, date: &CalendarDate) -> Result<f64, TimeError> {
        let days = date.days_since_epoch(self.calendar)?
            - self.reference.days_since_epoch(self.calendar)?;
        Ok(days * self.unit.per_day())
    }

    /// Decode a value in these units back to a date.
    pub fn decode(&self, value: f64) -> Result<CalendarDate, TimeError> {
        let days = self.reference.days_since_epoch(self.calendar)? + value / self.unit.per_day();
        CalendarDate::from_days_since_epoch(days, self.calendar)
    }

    /// Convert a value expressed in `other` units into these units.
    pub fn rebase(&self, value: f64, other: &TimeUnits) -> Result<f64, TimeError> {
        if self == other {
            return Ok(value);
        }
        self.encode(&other.decode(value)?)
    }
}

impl fmt::Display for TimeUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} since {}", self.unit.as_str(), self.reference)
    }
}
