//! # Subset Output Module
//!
//! Writes a [`Subset`] as a standalone NetCDF file (the default) or as a long
//! Parquet table, under a name derived from the request:
//!
//! ```text
//! {variable}_{frequency}_{scenario}_{model}_{year}_{zone}.{nc|parquet}
//! ```
//!
//! Local files are written to a temporary file in the destination directory and
//! renamed into place, so an interrupted run never leaves a partial output and a
//! rerun simply replaces the previous file. S3 destinations are staged in a local
//! temporary directory and uploaded once complete.

use log::debug;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConfigError, SubsetResult};
use crate::extract::{Axis, Subset};
use crate::input::RequestedWindow;
use crate::storage::{StorageBackend, StorageFactory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    NetCdf,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::NetCdf => "nc",
            OutputFormat::Parquet => "parquet",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::NetCdf => f.write_str("netcdf"),
            OutputFormat::Parquet => f.write_str("parquet"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "netcdf" | "nc" => Ok(OutputFormat::NetCdf),
            "parquet" => Ok(OutputFormat::Parquet),
            other => Err(ConfigError::Parse(format!("unknown output format '{}'", other))),
        }
    }
}

/// File name of the subset for one requested year.
pub fn output_file_name(request: &RequestedWindow, zone: &str, format: OutputFormat) -> String {
    format!(
        "{}_{}_{}_{}_{}_{}.{}",
        request.variable,
        request.frequency.code(),
        request.scenario,
        request.model,
        request.year,
        zone,
        format.extension()
    )
}

/// Joins an output directory (local or `s3://`) and a file name.
pub fn join_output_path(output_dir: &str, file_name: &str) -> String {
    if StorageFactory::is_s3_path(output_dir) {
        format!("{}/{}", output_dir.trim_end_matches('/'), file_name)
    } else {
        Path::new(output_dir).join(file_name).to_string_lossy().into_owned()
    }
}

/// Where the written subsets end up.
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    Local(PathBuf),
    S3(String),
}

impl Destination {
    pub fn parse(output_dir: &str) -> Self {
        if StorageFactory::is_s3_path(output_dir) {
            Destination::S3(output_dir.trim_end_matches('/').to_string())
        } else {
            Destination::Local(PathBuf::from(output_dir))
        }
    }

    /// Directory to write into, plus the guard of a staging directory for remote
    /// destinations.
    pub fn staging_dir(&self) -> SubsetResult<(PathBuf, Option<tempfile::TempDir>)> {
        match self {
            Destination::Local(dir) => {
                std::fs::create_dir_all(dir)?;
                Ok((dir.clone(), None))
            }
            Destination::S3(_) => {
                let staging = tempfile::Builder::new().prefix("cmip6-subset-").tempdir()?;
                Ok((staging.path().to_path_buf(), Some(staging)))
            }
        }
    }

    /// Moves a staged file to its final location and returns that location.
    pub async fn publish(&self, staged: &Path, file_name: &str) -> SubsetResult<String> {
        match self {
            Destination::Local(_) => Ok(staged.to_string_lossy().into_owned()),
            Destination::S3(prefix) => {
                let target = join_output_path(prefix, file_name);
                let storage = StorageFactory::from_path(&target).await?;
                let data = tokio::fs::read(staged).await?;
                storage.write(&target, &data).await?;
                debug!("Uploaded {} bytes to {}", data.len(), target);
                Ok(target)
            }
        }
    }
}

/// Origin of a subset, recorded as global attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub source_file: String,
    pub zone: String,
}

/// Writes `subset` into `dir/file_name` atomically, replacing any existing file.
pub fn write_subset(
    subset: &Subset,
    provenance: &Provenance,
    dir: &Path,
    file_name: &str,
    format: OutputFormat,
) -> SubsetResult<PathBuf> {
    let final_path = dir.join(file_name);
    let mut staged = tempfile::Builder::new()
        .prefix(".")
        .suffix(".part")
        .tempfile_in(dir)?;

    match format {
        OutputFormat::NetCdf => write_netcdf(subset, provenance, staged.path())?,
        OutputFormat::Parquet => {
            let mut df = subset_to_dataframe(subset)?;
            debug!("DataFrame shape: {:?}", df.shape());
            ParquetWriter::new(staged.as_file_mut()).finish(&mut df)?;
        }
    }

    staged.persist(&final_path)?;
    debug!("Wrote {}", final_path.display());
    Ok(final_path)
}

fn write_netcdf(subset: &Subset, provenance: &Provenance, path: &Path) -> SubsetResult<()> {
    let mut file = netcdf::create(path)?;

    for axis in [Axis::Time, Axis::Lat, Axis::Lon] {
        let coord = subset.coordinate(axis);
        file.add_dimension(&coord.name, coord.values.len())?;
    }
    for axis in [Axis::Time, Axis::Lat, Axis::Lon] {
        let coord = subset.coordinate(axis);
        let mut var = file.add_variable::<f64>(&coord.name, &[coord.name.as_str()])?;
        for (name, value) in &coord.attributes {
            var.put_attribute(name, value.as_str())?;
        }
        var.put_values(&coord.values, ..)?;
    }

    let dims = subset.dimension_names();
    let mut var = file.add_variable::<f32>(&subset.variable, &dims)?;
    if let Some(fill) = subset.fill_value {
        var.put_attribute("_FillValue", fill)?;
    }
    for (name, value) in &subset.attributes {
        var.put_attribute(name, value.as_str())?;
    }
    var.put_values(&subset.values, ..)?;

    file.add_attribute("source_file", provenance.source_file.as_str())?;
    file.add_attribute("time_index_start", subset.window.start as i64)?;
    file.add_attribute("time_index_end", subset.window.end as i64)?;
    file.add_attribute("zone", provenance.zone.as_str())?;
    if subset.lon_clipped {
        let (first, last) = (subset.lon.values.first(), subset.lon.values.last());
        if let (Some(first), Some(last)) = (first, last) {
            let note = format!(
                "zone crosses the prime meridian; only longitudes {} to {} were kept",
                first, last
            );
            file.add_attribute("lon_clipped", note.as_str())?;
        }
    }
    file.add_attribute(
        "history",
        format!(
            "subset of {} by {} {}",
            provenance.source_file,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )
        .as_str(),
    )?;

    Ok(())
}

/// Flattens a subset into one row per grid cell and time step.
///
/// Fill values become nulls.
pub fn subset_to_dataframe(subset: &Subset) -> PolarsResult<DataFrame> {
    let shape = subset.shape();
    let rows = subset.values.len();
    let mut coords: [Vec<f64>; 3] = [
        Vec::with_capacity(rows),
        Vec::with_capacity(rows),
        Vec::with_capacity(rows),
    ];

    for flat in 0..rows {
        let mut rest = flat;
        let mut index = [0usize; 3];
        for pos in (0..3).rev() {
            index[pos] = rest % shape[pos];
            rest /= shape[pos];
        }
        for (pos, axis) in subset.axes.iter().enumerate() {
            coords[axis_slot(*axis)].push(subset.coordinate(*axis).values[index[pos]]);
        }
    }

    let values: Vec<Option<f32>> = subset
        .values
        .iter()
        .map(|v| match subset.fill_value {
            Some(fill) if *v == fill => None,
            _ => Some(*v),
        })
        .collect();

    let [time, lat, lon] = coords;
    let columns = vec![
        Series::new(subset.time.name.as_str().into(), time).into(),
        Series::new(subset.lat.name.as_str().into(), lat).into(),
        Series::new(subset.lon.name.as_str().into(), lon).into(),
        Series::new(subset.variable.as_str().into(), values).into(),
    ];
    DataFrame::new(columns)
}

fn axis_slot(axis: Axis) -> usize {
    match axis {
        Axis::Time => 0,
        Axis::Lat => 1,
        Axis::Lon => 2,
    }
}
