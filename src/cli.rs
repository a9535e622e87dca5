//! # CLI Module
//!
//! This module provides the command-line interface for cmip6-subset, including:
//! - Argument parsing with clap
//! - Configuration file loading (JSON/YAML)
//! - Environment variable support with the CMIP6_SUBSET_ prefix
//! - Merging of configuration files with command-line overrides
//! - Subcommands for extraction, sweeps, inspection and catalog queries

use crate::catalog::{DEFAULT_DATA_NODE, DEFAULT_SEARCH_URL, DEFAULT_VARIANT};
use crate::geo::GeoBox;
use crate::input::{AccessMode, CatalogConfig, JobConfig, Region, YearSpan};
use crate::output::OutputFormat;
use crate::window::Frequency;
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Regional single-year subsets of CMIP6 climate projections
#[derive(Parser, Debug)]
#[command(name = "cmip6-subset")]
#[command(about = "Extract single-year regional subsets from CMIP6 model files")]
#[command(version)]
#[command(long_about = "
cmip6-subset finds the CMIP6 file that covers a requested year, works out which
time steps belong to that year and cuts the variable down to a longitude/latitude
box. Each year ends up in its own NetCDF (or Parquet) file.

FEATURES:
  • Catalogs: ESGF search API or a local directory mirror
  • Daily and monthly data, Gregorian leap years
  • Longitude boxes in [-180, 180] work on [0, 360) grids
  • Local or S3 output, written atomically
  • Multi-year sweeps with optional parallelism

EXAMPLES:
  # One year over Latin America
  cmip6-subset extract MPI-ESM1-2-HR ssp370 tas mon 2050 -90 -30 -60 20 Latinoamerica ./cmip6

  # Twenty years from a configuration file, four at a time
  cmip6-subset --config latinoamerica.yaml sweep --jobs 4

  # Which indices hold 2020 in a 2019-2021 daily file?
  cmip6-subset resolve --start-year 2019 --end-year 2021 --length 1096 --frequency day --year 2020

  # Inspect a downloaded file
  cmip6-subset info tas_Amon_MPI-ESM1-2-HR_ssp370_r1i1p1f1_gn_201501-203412.nc
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for reports
    #[arg(long, global = true, value_enum, default_value_t = ReportFormat::Human)]
    pub output_format: ReportFormat,

    /// Configuration file path (JSON or YAML)
    #[arg(short, long, global = true, env = "CMIP6_SUBSET_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract one year of one variable over a zone
    #[command(long_about = "
Extract one year of one variable over a longitude/latitude box.

Longitudes are given in [-180, 180] and latitudes in [-90, 90], west before east
and south before north. The output file is named
{variable}_{frequency}_{scenario}_{model}_{year}_{zone}.nc inside OUTPUT_DIR.

On grids stored in [0, 360) a zone crossing the prime meridian (for example
-20 to 20) keeps only its western part, up to 360; the file then carries a
lon_clipped global attribute.

EXAMPLES:
  cmip6-subset extract MPI-ESM1-2-HR ssp370 tas mon 2050 -90 -30 -60 20 Latinoamerica ./cmip6

  # Daily precipitation from a local mirror, written as Parquet
  cmip6-subset extract EC-Earth3 ssp585 pr day 2030 -80 -60 -40 0 Andes ./out \\
    --catalog-dir /data/cmip6 --format parquet
")]
    Extract(ExtractArgs),

    /// Process a span of years from a configuration file
    #[command(long_about = "
Run the extraction for every year of a span, inside one process.

The request comes from --config; the flags below override it. Years that no file
covers are reported and skipped. The exit status is 2 when any year produced an
empty subset and 1 when any year failed.

EXAMPLES:
  cmip6-subset --config latinoamerica.yaml sweep
  cmip6-subset --config latinoamerica.yaml sweep --start-year 2041 --end-year 2045 --jobs 2
")]
    Sweep(SweepArgs),

    /// Compute the time indices of a year within a multi-year file
    Resolve {
        /// First year stored in the file
        #[arg(long)]
        start_year: i32,

        /// Last year stored in the file
        #[arg(long)]
        end_year: i32,

        /// Number of samples along the time axis
        #[arg(long)]
        length: usize,

        /// Sampling frequency (day or mon)
        #[arg(long, value_parser = parse_frequency)]
        frequency: Frequency,

        /// Year to locate
        #[arg(long)]
        year: i32,
    },

    /// List the files a catalog offers for a dataset
    Search {
        model: String,
        scenario: String,
        variable: String,
        #[arg(value_parser = parse_frequency)]
        frequency: Frequency,

        /// Ensemble member
        #[arg(long, default_value = DEFAULT_VARIANT, env = "CMIP6_SUBSET_VARIANT")]
        variant: String,

        #[command(flatten)]
        catalog: CatalogArgs,
    },

    /// Show information about a NetCDF file
    #[command(long_about = "
Inspect a NetCDF file (local, S3 or HTTP) and display its structure together
with the decoded time span, calendar and longitude convention.

EXAMPLES:
  cmip6-subset info tas_Amon_MPI-ESM1-2-HR_ssp370_r1i1p1f1_gn_201501-203412.nc
  cmip6-subset info s3://bucket/tas.nc --detailed --output-format json
")]
    Info {
        /// NetCDF file path (local, S3 or HTTP)
        file: String,

        /// Include global attributes
        #[arg(long)]
        detailed: bool,

        /// Show only this variable
        #[arg(short = 'n', long)]
        variable: Option<String>,
    },

    /// Generate a configuration template
    Template {
        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration format
        #[arg(long, value_enum, default_value_t = ConfigFormat::Yaml)]
        format: ConfigFormat,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Climate model (source_id), e.g. MPI-ESM1-2-HR
    pub model: String,
    /// Scenario (experiment_id), e.g. ssp370
    pub scenario: String,
    /// Variable id, e.g. tas
    pub variable: String,
    /// Sampling frequency: day or mon
    #[arg(value_parser = parse_frequency)]
    pub frequency: Frequency,
    pub year: i32,
    #[arg(allow_negative_numbers = true)]
    pub lon_west: f64,
    #[arg(allow_negative_numbers = true)]
    pub lon_east: f64,
    #[arg(allow_negative_numbers = true)]
    pub lat_south: f64,
    #[arg(allow_negative_numbers = true)]
    pub lat_north: f64,
    /// Zone name used in the output file name
    pub zone: String,
    /// Local directory or s3://bucket/prefix
    pub output_dir: String,

    /// Ensemble member
    #[arg(long, default_value = DEFAULT_VARIANT, env = "CMIP6_SUBSET_VARIANT")]
    pub variant: String,

    /// Output file format
    #[arg(long, value_enum, default_value_t = FormatArg::Netcdf)]
    pub format: FormatArg,

    /// Open remote files through OPeNDAP instead of downloading them
    #[arg(long, env = "CMIP6_SUBSET_OPENDAP")]
    pub opendap: bool,

    #[command(flatten)]
    pub catalog: CatalogArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SweepArgs {
    /// First year (overrides the configuration)
    #[arg(long)]
    pub start_year: Option<i32>,

    /// Last year (overrides the configuration)
    #[arg(long)]
    pub end_year: Option<i32>,

    /// Years processed concurrently
    #[arg(short, long, env = "CMIP6_SUBSET_JOBS")]
    pub jobs: Option<usize>,

    /// Output directory (overrides the configuration)
    #[arg(long, env = "CMIP6_SUBSET_OUTPUT_DIR")]
    pub output_dir: Option<String>,

    #[command(flatten)]
    pub catalog: CatalogArgs,
}

/// Catalog selection shared by the commands that search for files.
#[derive(Args, Debug, Clone, Default)]
pub struct CatalogArgs {
    /// ESGF search endpoint
    #[arg(long, env = "CMIP6_SUBSET_SEARCH_URL")]
    pub search_url: Option<String>,

    /// Restrict the search to one data node
    #[arg(long, env = "CMIP6_SUBSET_DATA_NODE")]
    pub data_node: Option<String>,

    /// Search only the index node itself, not the whole federation
    #[arg(long)]
    pub no_distrib: bool,

    /// Use a local directory of CMIP6 files instead of ESGF (takes precedence)
    #[arg(long, env = "CMIP6_SUBSET_CATALOG_DIR")]
    pub catalog_dir: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human-readable output
    Human,
    /// JSON structured output
    Json,
    /// YAML structured output
    Yaml,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    /// NetCDF file (.nc)
    Netcdf,
    /// Parquet table (.parquet)
    Parquet,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Netcdf => OutputFormat::NetCdf,
            FormatArg::Parquet => OutputFormat::Parquet,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON configuration format
    Json,
    /// YAML configuration format
    Yaml,
}

fn parse_frequency(s: &str) -> Result<Frequency, String> {
    s.parse::<Frequency>().map_err(|e| e.to_string())
}

impl CatalogArgs {
    /// Applies the command-line catalog options on top of `base`.
    pub fn apply(&self, base: CatalogConfig) -> CatalogConfig {
        if let Some(path) = &self.catalog_dir {
            return CatalogConfig::Directory { path: path.clone() };
        }
        match base {
            CatalogConfig::Esgf {
                search_url,
                data_node,
                distributed,
            } => CatalogConfig::Esgf {
                search_url: self.search_url.clone().unwrap_or(search_url),
                data_node: self.data_node.clone().or(data_node),
                distributed: distributed && !self.no_distrib,
            },
            CatalogConfig::Directory { .. }
                if self.search_url.is_some() || self.data_node.is_some() =>
            {
                CatalogConfig::Esgf {
                    search_url: self
                        .search_url
                        .clone()
                        .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
                    data_node: self
                        .data_node
                        .clone()
                        .or_else(|| Some(DEFAULT_DATA_NODE.to_string())),
                    distributed: !self.no_distrib,
                }
            }
            directory => directory,
        }
    }
}

impl ExtractArgs {
    /// Builds the single-year job described by the positional arguments.
    pub fn to_job_config(&self, base: Option<&JobConfig>) -> JobConfig {
        let catalog = base.map(|c| c.catalog.clone()).unwrap_or_default();
        JobConfig {
            model: self.model.clone(),
            scenario: self.scenario.clone(),
            variable: self.variable.clone(),
            frequency: self.frequency,
            variant_label: self.variant.clone(),
            years: YearSpan::single(self.year),
            region: Region {
                name: self.zone.clone(),
                bbox: GeoBox::new(self.lon_west, self.lon_east, self.lat_south, self.lat_north),
            },
            output_dir: self.output_dir.clone(),
            output_format: self.format.into(),
            catalog: self.catalog.apply(catalog),
            access: if self.opendap {
                AccessMode::Opendap
            } else {
                AccessMode::Download
            },
            jobs: 1,
        }
    }
}

impl SweepArgs {
    /// Applies the overrides to a configuration loaded from file.
    pub fn apply(&self, mut config: JobConfig) -> JobConfig {
        if let Some(start) = self.start_year {
            config.years.start = start;
        }
        if let Some(end) = self.end_year {
            config.years.end = end;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
        config.catalog = self.catalog.apply(config.catalog);
        config
    }
}

/// Loads a JSON or YAML job configuration.
pub fn load_config(path: &Path) -> Result<JobConfig> {
    JobConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Renders the template configuration in the requested format.
pub fn generate_template(format: ConfigFormat) -> Result<String> {
    let template = JobConfig::template();
    let rendered = match format {
        ConfigFormat::Json => template.to_json()?,
        ConfigFormat::Yaml => template.to_yaml()?,
    };
    Ok(rendered)
}

/// Writes `content` to `output`, or stdout when no path is given.
pub fn write_or_print(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{}", content);
            Ok(())
        }
    }
}

pub fn generate_completions(shell: Shell, output: Option<&Path>) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let mut buffer = Vec::new();
    clap_complete::generate(shell, &mut cmd, name, &mut buffer);
    let script = String::from_utf8(buffer).context("Completion script is not UTF-8")?;
    match output {
        Some(path) => std::fs::write(path, script)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            print!("{}", script);
            Ok(())
        }
    }
}
