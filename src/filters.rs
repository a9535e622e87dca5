use crate::error::{SubsetError, SubsetResult};
use crate::window::TimeIndexRange;
use std::ops::Range;

/// Indices selected along one dimension of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    pub dimension: String,
    pub indices: Vec<usize>,
}

impl FilterResult {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Smallest contiguous range covering every selected index.
    ///
    /// Coordinates of a regular grid are monotonic, so a value-range selection is
    /// always contiguous; the covering range is what gets read from the file.
    pub fn span(&self) -> Option<Range<usize>> {
        let first = *self.indices.iter().min()?;
        let last = *self.indices.iter().max()?;
        Some(first..last + 1)
    }
}

pub trait NCFilter {
    fn apply(&self, file: &netcdf::File) -> SubsetResult<FilterResult>;
}

/// Selects the indices whose coordinate values lie in `[min_value, max_value]`.
pub struct NCRangeFilter {
    pub dimension_name: String,
    pub min_value: f64,
    pub max_value: f64,
}

impl NCRangeFilter {
    pub fn new(dimension_name: &str, min_value: f64, max_value: f64) -> Self {
        NCRangeFilter {
            dimension_name: dimension_name.to_string(),
            min_value,
            max_value,
        }
    }

    pub fn select(&self, values: &[f64]) -> Vec<usize> {
        select_in_range(values, self.min_value, self.max_value)
    }
}

impl NCFilter for NCRangeFilter {
    fn apply(&self, file: &netcdf::File) -> SubsetResult<FilterResult> {
        let values = coordinate_values(file, &self.dimension_name)?;
        Ok(FilterResult {
            dimension: self.dimension_name.clone(),
            indices: self.select(&values),
        })
    }
}

/// Selects a precomputed index window along a dimension, checked against its length.
pub struct NCIndexFilter {
    pub dimension_name: String,
    pub window: TimeIndexRange,
}

impl NCIndexFilter {
    pub fn new(dimension_name: &str, window: TimeIndexRange) -> Self {
        NCIndexFilter {
            dimension_name: dimension_name.to_string(),
            window,
        }
    }
}

impl NCFilter for NCIndexFilter {
    fn apply(&self, file: &netcdf::File) -> SubsetResult<FilterResult> {
        let dim = file
            .dimension(&self.dimension_name)
            .ok_or_else(|| SubsetError::MissingCoordinate(self.dimension_name.clone()))?;
        if !self.window.fits(dim.len()) {
            return Err(SubsetError::TimeAxisMismatch {
                range: self.window,
                available: dim.len(),
            });
        }
        Ok(FilterResult {
            dimension: self.dimension_name.clone(),
            indices: self.window.as_range().collect(),
        })
    }
}

/// Indices of `values` inside the inclusive range; works on ascending and
/// descending axes alike.
pub fn select_in_range(values: &[f64], min_value: f64, max_value: f64) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, val)| **val >= min_value && **val <= max_value)
        .map(|(idx, _)| idx)
        .collect()
}

/// Reads the whole coordinate variable named after a dimension.
pub fn coordinate_values(file: &netcdf::File, name: &str) -> SubsetResult<Vec<f64>> {
    let var = file
        .variable(name)
        .ok_or_else(|| SubsetError::MissingCoordinate(name.to_string()))?;
    Ok(var.get_values::<f64, _>(..)?)
}
