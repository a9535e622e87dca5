//! # Error Types
//!
//! Configuration problems are kept apart from runtime failures so that the
//! command line can reject bad parameters before touching the network.

use std::fmt;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::storage::StorageError;

/// A single violated bound of a geographic box.
#[derive(Debug, Clone, PartialEq)]
pub enum BoxViolation {
    Longitude { west: f64, east: f64 },
    Latitude { south: f64, north: f64 },
    LongitudeOutOfRange(f64),
    LatitudeOutOfRange(f64),
}

impl fmt::Display for BoxViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoxViolation::Longitude { west, east } => write!(
                f,
                "west longitude ({}) is greater than or equal to east longitude ({})",
                west, east
            ),
            BoxViolation::Latitude { south, north } => write!(
                f,
                "south latitude ({}) is greater than or equal to north latitude ({})",
                south, north
            ),
            BoxViolation::LongitudeOutOfRange(v) => {
                write!(f, "longitude {} is outside [-180, 180]", v)
            }
            BoxViolation::LatitudeOutOfRange(v) => {
                write!(f, "latitude {} is outside [-90, 90]", v)
            }
        }
    }
}

/// Invalid user-supplied parameters. Never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid zone coordinates: {}", join_violations(.0))]
    InvalidRegion(Vec<BoxViolation>),

    #[error("invalid year range: start year ({start}) is greater than end year ({end})")]
    InvertedYearRange { start: i32, end: i32 },

    #[error("missing required parameter: {0}")]
    MissingField(&'static str),

    #[error("invalid zone name '{0}': must be non-empty and contain no path separators")]
    InvalidZoneName(String),

    #[error("unknown frequency '{0}' (expected 'day' or 'mon')")]
    UnknownFrequency(String),

    #[error("failed to read configuration: {0}")]
    Parse(String),
}

fn join_violations(violations: &[BoxViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures of the per-year pipeline.
#[derive(Error, Debug)]
pub enum SubsetError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("Parquet error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to move output into place: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("variable '{0}' not found in dataset")]
    MissingVariable(String),

    #[error("coordinate variable for dimension '{0}' not found")]
    MissingCoordinate(String),

    #[error("variable '{variable}' has dimensions [{}], expected time, lat and lon", .dimensions.join(", "))]
    UnsupportedLayout {
        variable: String,
        dimensions: Vec<String>,
    },

    #[error("time window {range} does not fit a time axis of {available} samples")]
    TimeAxisMismatch {
        range: crate::window::TimeIndexRange,
        available: usize,
    },

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type SubsetResult<T> = Result<T, SubsetError>;
