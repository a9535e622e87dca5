//! # Time Window Resolution
//!
//! Maps a requested calendar year onto an index range of a multi-year file's time
//! axis. Archival files bundle many years of samples; the only reliable anchors are
//! the file's declared start and end years plus its total sample count, so the
//! offset is obtained by walking the calendar from the first year of the file.
//!
//! ```rust
//! use cmip6_subset::window::{resolve, CandidateFile, Frequency, TimeIndexRange};
//!
//! let file = CandidateFile::new(2019, 2021, 1096);
//! assert_eq!(resolve(&file, Frequency::Daily, 2020), Some(TimeIndexRange::new(365, 731)));
//! assert_eq!(resolve(&file, Frequency::Daily, 2022), None);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Sampling frequency of a dataset's time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "day", alias = "daily")]
    Daily,
    #[serde(rename = "mon", alias = "monthly")]
    Monthly,
}

impl Frequency {
    /// Short code used in catalog facets and output file names.
    pub fn code(&self) -> &'static str {
        match self {
            Frequency::Daily => "day",
            Frequency::Monthly => "mon",
        }
    }

    /// CMIP6 table identifier for surface variables at this frequency.
    pub fn table_id(&self) -> &'static str {
        match self {
            Frequency::Daily => "day",
            Frequency::Monthly => "Amon",
        }
    }

    /// Human-readable adjective used in progress messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Frequency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Frequency::Daily),
            "mon" | "monthly" => Ok(Frequency::Monthly),
            other => Err(ConfigError::UnknownFrequency(other.to_string())),
        }
    }
}

/// Gregorian leap-year rule: divisible by 4, except centuries not divisible by 400.
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of time samples a full calendar year contributes at the given frequency.
pub fn samples_in_year(frequency: Frequency, year: i32) -> usize {
    match frequency {
        Frequency::Monthly => 12,
        Frequency::Daily if is_leap_year(year) => 366,
        Frequency::Daily => 365,
    }
}

/// What the resolver needs to know about one file of the catalog listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateFile {
    pub start_year: i32,
    pub end_year: i32,
    pub time_axis_length: usize,
}

impl CandidateFile {
    pub fn new(start_year: i32, end_year: i32, time_axis_length: usize) -> Self {
        CandidateFile {
            start_year,
            end_year,
            time_axis_length,
        }
    }

    /// True when the file's year span contains `year`.
    pub fn covers(&self, year: i32) -> bool {
        self.start_year <= year && year <= self.end_year
    }
}

/// Half-open `[start, end)` index range along a time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeIndexRange {
    pub start: usize,
    pub end: usize,
}

impl TimeIndexRange {
    pub fn new(start: usize, end: usize) -> Self {
        TimeIndexRange { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the range is non-empty and lies inside an axis of `axis_len` samples.
    pub fn fits(&self, axis_len: usize) -> bool {
        self.start < self.end && self.end <= axis_len
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for TimeIndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Resolves the samples of `year` inside `file`.
///
/// Returns `None` when the file does not cover the year; callers are expected to
/// move on to the next candidate. When `year` is the file's last year the range
/// runs to the end of the axis, whatever its length, since files may stop short of
/// a complete final year.
pub fn resolve(file: &CandidateFile, frequency: Frequency, year: i32) -> Option<TimeIndexRange> {
    if !file.covers(year) {
        return None;
    }

    let start: usize = (file.start_year..year)
        .map(|y| samples_in_year(frequency, y))
        .sum();

    let end = if year == file.end_year {
        file.time_axis_length
    } else {
        start + samples_in_year(frequency, year)
    };

    Some(TimeIndexRange::new(start, end))
}
