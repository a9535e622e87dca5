//! # Subset Extraction
//!
//! Slices one variable of an open NetCDF file down to a time window and a
//! geographic box. The variable must be laid out over time, latitude and
//! longitude (in any order); the slice is read in a single hyperslab call and
//! kept in memory as a [`Subset`].
//!
//! ## Key Components
//!
//! - [`extract`]: applies the time and coordinate filters and reads the data
//! - [`Subset`]: the selected values with their coordinates and metadata
//! - [`verify_year`]: decodes the selected time stamps to confirm the window

use log::{debug, warn};

use crate::error::{SubsetError, SubsetResult};
use crate::filters::{FilterResult, NCFilter, NCIndexFilter, NCRangeFilter, coordinate_values};
use crate::geo::{GeoBox, LongitudeConvention};
use crate::timeaxis::{Calendar, TimeUnits};
use crate::window::TimeIndexRange;

/// Attributes copied from the source variables.
const CARRIED_ATTRIBUTES: &[&str] = &[
    "units",
    "long_name",
    "standard_name",
    "axis",
    "calendar",
    "cell_methods",
];

/// Role of a dimension in a gridded variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Time,
    Lat,
    Lon,
}

impl Axis {
    pub fn from_dimension(name: &str) -> Option<Self> {
        match name {
            "time" => Some(Axis::Time),
            "lat" | "latitude" => Some(Axis::Lat),
            "lon" | "longitude" => Some(Axis::Lon),
            _ => None,
        }
    }
}

/// A coordinate variable restricted to the selected indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub name: String,
    pub values: Vec<f64>,
    pub attributes: Vec<(String, String)>,
}

impl Coordinate {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// One variable sliced to a year and a box.
///
/// `values` is row-major in the source dimension order given by `axes`.
#[derive(Debug, Clone)]
pub struct Subset {
    pub variable: String,
    pub attributes: Vec<(String, String)>,
    pub fill_value: Option<f32>,
    pub axes: Vec<Axis>,
    pub time: Coordinate,
    pub lat: Coordinate,
    pub lon: Coordinate,
    pub values: Vec<f32>,
    pub window: TimeIndexRange,
    /// Longitude convention of the source grid; `lon` values are kept in it
    pub convention: LongitudeConvention,
    /// The box crossed the prime meridian on a [0, 360) grid and lost its eastern part
    pub lon_clipped: bool,
}

impl Subset {
    pub fn coordinate(&self, axis: Axis) -> &Coordinate {
        match axis {
            Axis::Time => &self.time,
            Axis::Lat => &self.lat,
            Axis::Lon => &self.lon,
        }
    }

    pub fn dimension_names(&self) -> Vec<&str> {
        self.axes
            .iter()
            .map(|axis| self.coordinate(*axis).name.as_str())
            .collect()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.axes
            .iter()
            .map(|axis| self.coordinate(*axis).values.len())
            .collect()
    }

    /// True when both spatial axes kept at least one point.
    pub fn has_spatial_extent(&self) -> bool {
        !self.lat.values.is_empty() && !self.lon.values.is_empty()
    }
}

/// Slices `variable` to the time `window` and the box `bbox`.
///
/// A box that misses the grid yields a subset with an empty spatial axis and no
/// values; callers check [`Subset::has_spatial_extent`] before writing.
pub fn extract(
    file: &netcdf::File,
    variable: &str,
    window: TimeIndexRange,
    bbox: &GeoBox,
) -> SubsetResult<Subset> {
    let var = file
        .variable(variable)
        .ok_or_else(|| SubsetError::MissingVariable(variable.to_string()))?;

    let dimensions: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
    let axes = classify_dimensions(variable, &dimensions)?;
    let time_name = dimension_for(&axes, &dimensions, Axis::Time);
    let lat_name = dimension_for(&axes, &dimensions, Axis::Lat);
    let lon_name = dimension_for(&axes, &dimensions, Axis::Lon);

    let time_filter = NCIndexFilter::new(time_name, window);
    let time_result = time_filter.apply(file)?;

    let lon_values = coordinate_values(file, lon_name)?;
    let convention = LongitudeConvention::detect(&lon_values);
    let (lon_min, mut lon_max) = bbox.lon_bounds(convention);
    let lon_clipped = convention == LongitudeConvention::Positive && lon_max > 360.0;
    if lon_clipped {
        warn!(
            "Box crosses the prime meridian on a [0, 360) grid; keeping only {} to 360",
            lon_min
        );
        lon_max = 360.0;
    }
    debug!(
        "Longitude convention {}, selecting lon in [{}, {}]",
        convention, lon_min, lon_max
    );

    let lon_filter = NCRangeFilter::new(lon_name, lon_min, lon_max);
    let lon_result = FilterResult {
        dimension: lon_name.to_string(),
        indices: lon_filter.select(&lon_values),
    };
    let (lat_min, lat_max) = bbox.lat_bounds();
    let lat_result = NCRangeFilter::new(lat_name, lat_min, lat_max).apply(file)?;

    debug!(
        "Selected {} time steps, {} latitudes, {} longitudes",
        time_result.len(),
        lat_result.len(),
        lon_result.len()
    );

    let time_span = time_result.span().unwrap_or(window.start..window.start);
    let lat_span = lat_result.span();
    let lon_span = lon_result.span();

    let time = Coordinate {
        name: time_name.to_string(),
        values: match file.variable(time_name) {
            Some(tv) => tv.get_values::<f64, _>(time_span.clone())?,
            None => time_span.clone().map(|i| i as f64).collect(),
        },
        attributes: string_attributes(file.variable(time_name).as_ref()),
    };
    let lat = Coordinate {
        name: lat_name.to_string(),
        values: lat_span
            .clone()
            .map(|s| coordinate_values(file, lat_name).map(|all| all[s].to_vec()))
            .transpose()?
            .unwrap_or_default(),
        attributes: string_attributes(file.variable(lat_name).as_ref()),
    };
    let lon = Coordinate {
        name: lon_name.to_string(),
        values: lon_span
            .clone()
            .map(|s| lon_values[s].to_vec())
            .unwrap_or_default(),
        attributes: string_attributes(file.variable(lon_name).as_ref()),
    };

    let values = match (lat_span, lon_span) {
        (Some(lat_span), Some(lon_span)) => {
            let span_of = |axis: Axis| match axis {
                Axis::Time => time_span.clone(),
                Axis::Lat => lat_span.clone(),
                Axis::Lon => lon_span.clone(),
            };
            let extents = (span_of(axes[0]), span_of(axes[1]), span_of(axes[2]));
            var.get_values::<f32, _>(extents)?
        }
        _ => Vec::new(),
    };

    Ok(Subset {
        variable: variable.to_string(),
        attributes: string_attributes(Some(&var)),
        fill_value: fill_value(&var),
        axes,
        time,
        lat,
        lon,
        values,
        window,
        convention,
        lon_clipped,
    })
}

/// Number of samples along the time dimension of `variable`.
pub fn time_axis_length(file: &netcdf::File, variable: &str) -> SubsetResult<usize> {
    let var = file
        .variable(variable)
        .ok_or_else(|| SubsetError::MissingVariable(variable.to_string()))?;
    var.dimensions()
        .iter()
        .find(|d| Axis::from_dimension(&d.name()) == Some(Axis::Time))
        .map(|d| d.len())
        .ok_or_else(|| SubsetError::MissingCoordinate("time".to_string()))
}

fn classify_dimensions(variable: &str, dimensions: &[String]) -> SubsetResult<Vec<Axis>> {
    let layout_error = || SubsetError::UnsupportedLayout {
        variable: variable.to_string(),
        dimensions: dimensions.to_vec(),
    };
    if dimensions.len() != 3 {
        return Err(layout_error());
    }
    let axes: Vec<Axis> = dimensions
        .iter()
        .map(|d| Axis::from_dimension(d))
        .collect::<Option<_>>()
        .ok_or_else(layout_error)?;
    for axis in [Axis::Time, Axis::Lat, Axis::Lon] {
        if !axes.contains(&axis) {
            return Err(layout_error());
        }
    }
    Ok(axes)
}

fn dimension_for<'a>(axes: &[Axis], dimensions: &'a [String], axis: Axis) -> &'a str {
    let pos = axes.iter().position(|a| *a == axis).unwrap_or_default();
    &dimensions[pos]
}

fn string_attributes(var: Option<&netcdf::Variable>) -> Vec<(String, String)> {
    let Some(var) = var else {
        return Vec::new();
    };
    CARRIED_ATTRIBUTES
        .iter()
        .filter_map(|name| match var.attribute_value(name)?.ok()? {
            netcdf::AttributeValue::Str(value) => Some((name.to_string(), value)),
            _ => None,
        })
        .collect()
}

fn fill_value(var: &netcdf::Variable) -> Option<f32> {
    ["_FillValue", "missing_value"].iter().find_map(|name| {
        let value = var.attribute_value(name)?.ok()?;
        f32::try_from(value).ok()
    })
}

/// Checks that the first and last selected time stamps fall in `year`.
///
/// Returns `false` and logs a warning on a mismatch; an undecodable time axis
/// only produces a debug message.
pub fn verify_year(subset: &Subset, year: i32) -> bool {
    let calendar = Calendar::from_attribute(subset.time.attribute("calendar"));
    if let Calendar::Unsupported(name) = &calendar {
        warn!(
            "Calendar '{}' is not Gregorian; the window for {} may be offset",
            name, year
        );
    }

    let Some(units) = subset.time.attribute("units").and_then(TimeUnits::parse) else {
        debug!("Time axis has no decodable units, skipping year check");
        return true;
    };
    let (Some(first), Some(last)) = (subset.time.values.first(), subset.time.values.last()) else {
        return true;
    };

    let years = (units.year_of(*first), units.year_of(*last));
    match years {
        (Some(a), Some(b)) if a == year && b == year => true,
        (Some(a), Some(b)) => {
            warn!(
                "Time window {} spans {}..{} instead of {}",
                subset.window, a, b, year
            );
            false
        }
        _ => true,
    }
}
