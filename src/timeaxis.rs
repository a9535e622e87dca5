//! # CF Time Axis Decoding
//!
//! Decodes `"<unit> since <reference>"` time coordinates for diagnostics. Index
//! resolution never depends on these values; they only confirm that a resolved
//! window starts and ends in the requested year.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

/// Calendars named by the CF `calendar` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Calendar {
    Gregorian,
    /// Any calendar the window resolver does not model (noleap, 360_day, ...)
    Unsupported(String),
}

impl Calendar {
    pub fn from_attribute(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            None => Calendar::Gregorian,
            Some(name) => match name.as_str() {
                "standard" | "gregorian" | "proleptic_gregorian" | "" => Calendar::Gregorian,
                _ => Calendar::Unsupported(name),
            },
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Calendar::Gregorian)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

/// Parsed CF `units` attribute of a time coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeUnits {
    unit: TimeUnit,
    reference: NaiveDateTime,
}

impl TimeUnits {
    /// Parses strings such as `days since 1850-01-01` or
    /// `hours since 2015-01-01 00:00:00`.
    pub fn parse(units: &str) -> Option<Self> {
        let (unit, reference) = units.split_once(" since ")?;
        let unit = match unit.trim().to_ascii_lowercase().as_str() {
            "days" | "day" | "d" => TimeUnit::Days,
            "hours" | "hour" | "h" => TimeUnit::Hours,
            "minutes" | "minute" | "min" => TimeUnit::Minutes,
            "seconds" | "second" | "s" => TimeUnit::Seconds,
            _ => return None,
        };
        let reference = parse_reference(reference.trim())?;
        Some(TimeUnits { unit, reference })
    }

    /// Converts a coordinate value to a date on the Gregorian calendar.
    pub fn decode(&self, value: f64) -> Option<NaiveDateTime> {
        let seconds = match self.unit {
            TimeUnit::Days => value * 86_400.0,
            TimeUnit::Hours => value * 3_600.0,
            TimeUnit::Minutes => value * 60.0,
            TimeUnit::Seconds => value,
        };
        if !seconds.is_finite() {
            return None;
        }
        self.reference
            .checked_add_signed(Duration::seconds(seconds.round() as i64))
    }

    /// Calendar year of a coordinate value.
    pub fn year_of(&self, value: f64) -> Option<i32> {
        self.decode(value).map(|d| d.year())
    }
}

fn parse_reference(reference: &str) -> Option<NaiveDateTime> {
    // Drop a trailing timezone designator such as "UTC" or "Z".
    let reference = reference
        .trim_end_matches(" UTC")
        .trim_end_matches('Z')
        .replace('T', " ");
    let mut parts = reference.split_whitespace();
    let date_part = parts.next()?;
    let date = parse_date(date_part)?;
    match parts.next() {
        Some(time_part) => {
            let time_part = time_part.split('.').next().unwrap_or(time_part);
            let mut hms = time_part.split(':').map(|p| p.parse::<u32>().ok());
            let h = hms.next().flatten().unwrap_or(0);
            let m = hms.next().flatten().unwrap_or(0);
            let s = hms.next().flatten().unwrap_or(0);
            date.and_hms_opt(h, m, s)
        }
        None => date.and_hms_opt(0, 0, 0),
    }
}

/// Accepts non-padded dates like `1850-1-1` that appear in older files.
fn parse_date(text: &str) -> Option<NaiveDate> {
    let mut fields = text.split('-').map(|f| f.parse::<i64>().ok());
    let year = fields.next().flatten()?;
    let month = fields.next().flatten().unwrap_or(1);
    let day = fields.next().flatten().unwrap_or(1);
    NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
}
