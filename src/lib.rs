//! # cmip6-subset
//!
//! A Rust library for locating CMIP6 model files that cover a requested year and
//! cutting them down to a single year over a geographic region.
//!
//! ## Features
//!
//! - **Year windows**: maps a calendar year onto the index range of a multi-year
//!   daily or monthly time axis, with the Gregorian leap-year rule
//! - **Region boxes**: selects latitude/longitude ranges, translating western
//!   boxes for grids stored in [0, 360)
//! - **Catalogs**: ESGF search API or a local mirror directory
//! - **Outputs**: NetCDF (default) or Parquet, local or on S3, written atomically
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cmip6_subset::{build_catalog, process_year, input::JobConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = JobConfig::from_file("latinoamerica.yaml")?;
//! config.validate()?;
//! let catalog = build_catalog(&config)?;
//! let outcome = process_year(&config, catalog.as_ref(), 2050, true).await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! model: MPI-ESM1-2-HR
//! scenario: ssp370
//! variable: tas
//! frequency: mon
//! years: {start: 2041, end: 2060}
//! region: {name: Latinoamerica, lon_west: -90, lon_east: -30, lat_south: -60, lat_north: 20}
//! output_dir: ./cmip6
//! ```

pub mod catalog;
pub mod cli;
pub mod error;
pub mod extract;
pub mod filters;
pub mod geo;
pub mod info;
pub mod input;
pub mod log;
pub mod output;
pub mod storage;
pub mod sweep;
pub mod timeaxis;
pub mod window;

#[cfg(test)]
mod tests;


use ::log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;

use crate::catalog::{Catalog, DirectoryCatalog, EsgfCatalog, FileDescriptor};
use crate::error::SubsetResult;
use crate::input::{AccessMode, CatalogConfig, JobConfig};
use crate::output::{Destination, OutputFormat, Provenance, output_file_name, write_subset};
use crate::storage::SourceCache;
use crate::window::{CandidateFile, Frequency, TimeIndexRange, resolve};

/// A subset that made it to its destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrittenSubset {
    pub year: i32,
    pub source: String,
    pub output: String,
    pub window: TimeIndexRange,
    /// Lengths along the source dimension order
    pub shape: Vec<usize>,
    /// Whether the decoded time stamps all fell in `year`
    pub year_verified: bool,
}

/// Result of processing one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum YearOutcome {
    Written(WrittenSubset),
    /// No catalog file covers the year; `scanned` files were listed
    NoMatch { year: i32, scanned: usize },
    /// The box selected no grid points; nothing was written
    EmptySubset {
        year: i32,
        source: String,
        lat_len: usize,
        lon_len: usize,
    },
}

/// Creates the catalog named by the configuration.
pub fn build_catalog(config: &JobConfig) -> SubsetResult<Box<dyn Catalog>> {
    catalog_for(&config.catalog)
}

pub fn catalog_for(catalog: &CatalogConfig) -> SubsetResult<Box<dyn Catalog>> {
    match catalog {
        CatalogConfig::Esgf {
            search_url,
            distributed,
            ..
        } => Ok(Box::new(EsgfCatalog::new(search_url, *distributed)?)),
        CatalogConfig::Directory { path } => Ok(Box::new(DirectoryCatalog::new(path))),
    }
}

/// What the blocking NetCDF stage produced for one candidate.
enum CandidateResult {
    OutsideWindow,
    Empty { lat_len: usize, lon_len: usize },
    Written {
        path: PathBuf,
        window: TimeIndexRange,
        shape: Vec<usize>,
        year_verified: bool,
    },
}

/// Everything the blocking stage needs, owned so it can cross into `spawn_blocking`.
struct CandidateJob {
    dataset: String,
    variable: String,
    frequency: Frequency,
    year: i32,
    span: (i32, i32),
    bbox: geo::GeoBox,
    staging: PathBuf,
    file_name: String,
    format: OutputFormat,
    provenance: Provenance,
}

impl CandidateJob {
    fn run(self) -> SubsetResult<CandidateResult> {
        let file = netcdf::open(&self.dataset)?;
        let length = extract::time_axis_length(&file, &self.variable)?;
        let candidate = CandidateFile::new(self.span.0, self.span.1, length);

        let Some(window) = resolve(&candidate, self.frequency, self.year) else {
            return Ok(CandidateResult::OutsideWindow);
        };
        debug!(
            "{}: {} samples, year {} -> {}",
            self.provenance.source_file, length, self.year, window
        );

        let subset = extract::extract(&file, &self.variable, window, &self.bbox)?;
        if !subset.has_spatial_extent() {
            return Ok(CandidateResult::Empty {
                lat_len: subset.lat.values.len(),
                lon_len: subset.lon.values.len(),
            });
        }
        let year_verified = extract::verify_year(&subset, self.year);

        let path = write_subset(
            &subset,
            &self.provenance,
            &self.staging,
            &self.file_name,
            self.format,
        )?;
        Ok(CandidateResult::Written {
            path,
            window,
            shape: subset.shape(),
            year_verified,
        })
    }
}

/// Processes one year: finds the covering file, cuts the region out and writes it.
///
/// Candidates are scanned in start-year order and scanning stops at the first
/// file covering `year`. Files whose name does not encode a date range are
/// skipped without being fetched.
pub async fn process_year(
    config: &JobConfig,
    catalog: &dyn Catalog,
    year: i32,
    show_progress: bool,
) -> SubsetResult<YearOutcome> {
    config.validate()?;

    let files = catalog.search(&config.facet_query()).await?;
    info!("Catalog returned {} files for {}", files.len(), year);
    process_listed_year(config, &files, year, &SourceCache::new(show_progress)).await
}

/// [`process_year`] over an existing catalog listing, taking source files from
/// `sources` so a file covering several years is fetched once.
pub async fn process_listed_year(
    config: &JobConfig,
    files: &[FileDescriptor],
    year: i32,
    sources: &SourceCache,
) -> SubsetResult<YearOutcome> {
    config.validate()?;
    let request = config.window(year);

    for descriptor in files {
        let Some(span) = descriptor.year_span() else {
            warn!("Skipping {}: no date range in file name", descriptor.name);
            continue;
        };
        if year < span.0 || year > span.1 {
            debug!("Skipping {}: covers {}-{}", descriptor.name, span.0, span.1);
            continue;
        }

        let (dataset, _local) = match open_handle(descriptor, config.access) {
            Some(url) => (url, None),
            None => {
                let local = sources.get(&descriptor.access).await?;
                (local.path().to_string_lossy().into_owned(), Some(local))
            }
        };

        let destination = Destination::parse(&config.output_dir);
        let (staging, _staging_guard) = destination.staging_dir()?;
        let file_name = output_file_name(&request, &config.region.name, config.output_format);

        let job = CandidateJob {
            dataset,
            variable: config.variable.clone(),
            frequency: config.frequency,
            year,
            span,
            bbox: config.geo_box(),
            staging,
            file_name: file_name.clone(),
            format: config.output_format,
            provenance: Provenance {
                source_file: descriptor.name.clone(),
                zone: config.region.name.clone(),
            },
        };

        match tokio::task::spawn_blocking(move || job.run()).await?? {
            CandidateResult::OutsideWindow => continue,
            CandidateResult::Empty { lat_len, lon_len } => {
                return Ok(YearOutcome::EmptySubset {
                    year,
                    source: descriptor.name.clone(),
                    lat_len,
                    lon_len,
                });
            }
            CandidateResult::Written {
                path,
                window,
                shape,
                year_verified,
            } => {
                let output = destination.publish(&path, &file_name).await?;
                return Ok(YearOutcome::Written(WrittenSubset {
                    year,
                    source: descriptor.name.clone(),
                    output,
                    window,
                    shape,
                    year_verified,
                }));
            }
        }
    }

    Ok(YearOutcome::NoMatch {
        year,
        scanned: files.len(),
    })
}

/// OPeNDAP endpoint to open directly, when that access mode is requested and offered.
fn open_handle(descriptor: &FileDescriptor, access: AccessMode) -> Option<String> {
    match access {
        AccessMode::Opendap => descriptor.opendap.clone(),
        AccessMode::Download => None,
    }
}
