//! # Input Configuration Module
//!
//! Job configuration for cmip6-subset runs. A configuration names the dataset
//! facets, the years to process, the region to cut out and where the subsets go.
//! JSON and YAML files are accepted; the format is picked from the extension.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cmip6_subset::input::JobConfig;
//!
//! let config = JobConfig::from_file("latinoamerica.yaml")?;
//! config.validate()?;
//! for year in config.years.start..=config.years.end {
//!     println!("{:?}", config.window(year));
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::catalog::{DEFAULT_DATA_NODE, DEFAULT_SEARCH_URL, DEFAULT_VARIANT, FacetQuery};
use crate::error::ConfigError;
use crate::geo::GeoBox;
use crate::output::OutputFormat;
use crate::window::Frequency;

/// The identity of one yearly subset request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedWindow {
    pub model: String,
    pub scenario: String,
    pub variable: String,
    pub frequency: Frequency,
    pub year: i32,
}

/// Inclusive range of years to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearSpan {
    pub start: i32,
    pub end: i32,
}

impl YearSpan {
    pub fn single(year: i32) -> Self {
        YearSpan {
            start: year,
            end: year,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start > self.end {
            return Err(ConfigError::InvertedYearRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }

    pub fn count(&self) -> usize {
        (self.end - self.start + 1).max(0) as usize
    }
}

/// Named geographic box; the name becomes part of every output file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    #[serde(flatten)]
    pub bbox: GeoBox,
}

impl Region {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ConfigError::InvalidZoneName(self.name.clone()));
        }
        self.bbox.validate()
    }
}

/// Source of the candidate file lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CatalogConfig {
    /// ESGF search API
    Esgf {
        #[serde(default = "default_search_url")]
        search_url: String,
        #[serde(default = "default_data_node")]
        data_node: Option<String>,
        #[serde(default = "default_true")]
        distributed: bool,
    },
    /// Local directory holding CMIP6-named files
    Directory { path: String },
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig::Esgf {
            search_url: default_search_url(),
            data_node: default_data_node(),
            distributed: true,
        }
    }
}

/// How a remote file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Fetch the whole file to a temporary location first
    #[default]
    Download,
    /// Hand the OPeNDAP endpoint straight to libnetcdf
    Opendap,
}

fn default_search_url() -> String {
    DEFAULT_SEARCH_URL.to_string()
}

fn default_data_node() -> Option<String> {
    Some(DEFAULT_DATA_NODE.to_string())
}

fn default_variant() -> String {
    DEFAULT_VARIANT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_jobs() -> usize {
    1
}

/// Main configuration structure for cmip6-subset jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Climate model, e.g. `MPI-ESM1-2-HR`
    pub model: String,
    /// Experiment, e.g. `ssp370`
    pub scenario: String,
    /// CMIP6 variable id, e.g. `tas`
    pub variable: String,
    pub frequency: Frequency,
    #[serde(default = "default_variant")]
    pub variant_label: String,
    pub years: YearSpan,
    pub region: Region,
    /// Local directory or `s3://bucket/prefix`
    pub output_dir: String,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub access: AccessMode,
    /// Years processed concurrently by a sweep
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl JobConfig {
    /// Loads a job configuration from a JSON or YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }

    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Checks everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.region.validate()?;
        self.years.validate()?;

        let required = [
            ("model", &self.model),
            ("scenario", &self.scenario),
            ("variable", &self.variable),
            ("variant_label", &self.variant_label),
            ("output_dir", &self.output_dir),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(field));
            }
        }
        if self.jobs == 0 {
            return Err(ConfigError::Parse("jobs must be at least 1".to_string()));
        }
        match &self.catalog {
            CatalogConfig::Directory { path } if path.trim().is_empty() => {
                Err(ConfigError::MissingField("catalog.path"))
            }
            _ => Ok(()),
        }
    }

    pub fn window(&self, year: i32) -> RequestedWindow {
        RequestedWindow {
            model: self.model.clone(),
            scenario: self.scenario.clone(),
            variable: self.variable.clone(),
            frequency: self.frequency,
            year,
        }
    }

    pub fn geo_box(&self) -> GeoBox {
        self.region.bbox
    }

    pub fn facet_query(&self) -> FacetQuery {
        let data_node = match &self.catalog {
            CatalogConfig::Esgf { data_node, .. } => data_node.clone(),
            CatalogConfig::Directory { .. } => None,
        };
        FacetQuery::new(&self.model, &self.scenario, &self.variable, self.frequency)
            .with_variant(&self.variant_label)
            .with_data_node(data_node)
    }

    /// Ready-to-edit configuration: monthly near-surface temperature over Latin America.
    pub fn template() -> Self {
        JobConfig {
            model: "MPI-ESM1-2-HR".to_string(),
            scenario: "ssp370".to_string(),
            variable: "tas".to_string(),
            frequency: Frequency::Monthly,
            variant_label: default_variant(),
            years: YearSpan {
                start: 2041,
                end: 2060,
            },
            region: Region {
                name: "Latinoamerica".to_string(),
                bbox: GeoBox::new(-90.0, -30.0, -60.0, 20.0),
            },
            output_dir: "./cmip6".to_string(),
            output_format: OutputFormat::NetCdf,
            catalog: CatalogConfig::default(),
            access: AccessMode::Download,
            jobs: 1,
        }
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
