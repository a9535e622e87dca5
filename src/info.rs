//! # Dataset Information Module
//!
//! Inspects a CMIP6 NetCDF file (local, `s3://` or `http(s)://`) and reports its
//! dimensions and variables together with what the subsetting pipeline cares
//! about: the decoded time span, the calendar, the longitude convention and the
//! year range encoded in the file name.

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::year_span;
use crate::filters::coordinate_values;
use crate::geo::LongitudeConvention;
use crate::storage::{StorageFactory, materialize};
use crate::timeaxis::{Calendar, TimeUnits};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionInfo {
    pub name: String,
    pub length: usize,
    pub is_unlimited: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    pub data_type: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    pub attributes: BTreeMap<String, String>,
}

/// Decoded summary of the `time` coordinate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSummary {
    pub length: usize,
    pub units: Option<String>,
    pub calendar: Option<String>,
    pub calendar_supported: bool,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub path: String,
    pub file_size: Option<u64>,
    /// Years encoded in the file name, if any
    pub name_years: Option<(i32, i32)>,
    pub time: Option<TimeSummary>,
    pub longitude_convention: Option<LongitudeConvention>,
    pub dimensions: Vec<DimensionInfo>,
    pub variables: Vec<VariableInfo>,
    pub global_attributes: BTreeMap<String, String>,
}

fn format_attribute_value(value: &netcdf::AttributeValue) -> String {
    match value {
        netcdf::AttributeValue::Str(s) => s.clone(),
        other => format!("{:?}", other),
    }
}

fn string_attribute(var: &netcdf::Variable, name: &str) -> Option<String> {
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn summarize_time(file: &netcdf::File) -> Option<TimeSummary> {
    let var = file.variable("time")?;
    let units = string_attribute(&var, "units");
    let calendar = string_attribute(&var, "calendar");
    let values = var.get_values::<f64, _>(..).ok()?;

    let decoder = units.as_deref().and_then(TimeUnits::parse);
    let year_at = |v: Option<&f64>| decoder.as_ref().zip(v).and_then(|(d, v)| d.year_of(*v));

    Some(TimeSummary {
        length: values.len(),
        calendar_supported: Calendar::from_attribute(calendar.as_deref()).is_supported(),
        first_year: year_at(values.first()),
        last_year: year_at(values.last()),
        units,
        calendar,
    })
}

fn inspect(file: &netcdf::File, path: &str, variable: Option<&str>, detailed: bool) -> DatasetInfo {
    let dimensions = file
        .dimensions()
        .map(|dim| DimensionInfo {
            name: dim.name().to_string(),
            length: dim.len(),
            is_unlimited: dim.is_unlimited(),
        })
        .collect();

    let variables = file
        .variables()
        .filter(|var| variable.is_none_or(|wanted| var.name() == wanted))
        .map(|var| VariableInfo {
            name: var.name().to_string(),
            data_type: format!("{:?}", var.vartype()),
            dimensions: var.dimensions().iter().map(|d| d.name().to_string()).collect(),
            shape: var.dimensions().iter().map(|d| d.len()).collect(),
            attributes: var
                .attributes()
                .filter_map(|attr| {
                    let value = attr.value().ok()?;
                    Some((attr.name().to_string(), format_attribute_value(&value)))
                })
                .collect(),
        })
        .collect();

    let global_attributes = if detailed {
        file.attributes()
            .filter_map(|attr| {
                let value = attr.value().ok()?;
                Some((attr.name().to_string(), format_attribute_value(&value)))
            })
            .collect()
    } else {
        BTreeMap::new()
    };

    let longitude_convention = ["lon", "longitude"]
        .iter()
        .find_map(|name| coordinate_values(file, name).ok())
        .map(|values| LongitudeConvention::detect(&values));

    let file_name = path.rsplit('/').next().unwrap_or(path);

    DatasetInfo {
        path: path.to_string(),
        file_size: None,
        name_years: year_span(file_name),
        time: summarize_time(file),
        longitude_convention,
        dimensions,
        variables,
        global_attributes,
    }
}

/// Extracts information from a dataset, fetching remote files first.
pub async fn get_dataset_info(
    path: &str,
    variable: Option<&str>,
    detailed: bool,
) -> Result<DatasetInfo> {
    let local = materialize(path, false)
        .await
        .with_context(|| format!("Failed to fetch {}", path))?;
    debug!("Opening NetCDF file: {}", local.path().display());

    let file = netcdf::open(local.path())
        .with_context(|| format!("Failed to open NetCDF file: {}", path))?;
    let mut info = inspect(&file, path, variable, detailed);
    file.close().context("Failed to close NetCDF file")?;

    info.file_size = if StorageFactory::is_local_path(path) {
        tokio::fs::metadata(local.path()).await.ok().map(|m| m.len())
    } else {
        None
    };
    Ok(info)
}

pub fn print_info_human(info: &DatasetInfo) {
    println!("Dataset: {}", info.path);
    if let Some(size) = info.file_size {
        println!("  File Size: {:.2} MB", size as f64 / 1_048_576.0);
    }
    if let Some((start, end)) = info.name_years {
        println!("  Years in name: {}-{}", start, end);
    }
    if let Some(time) = &info.time {
        let span = match (time.first_year, time.last_year) {
            (Some(a), Some(b)) => format!("{}-{}", a, b),
            _ => "undecodable".to_string(),
        };
        println!("  Time: {} samples, {}", time.length, span);
        if let Some(calendar) = &time.calendar {
            let note = if time.calendar_supported { "" } else { " (not Gregorian)" };
            println!("  Calendar: {}{}", calendar, note);
        }
    }
    if let Some(convention) = info.longitude_convention {
        println!("  Longitude: {}", convention);
    }

    println!("  Dimensions:");
    for dim in &info.dimensions {
        println!(
            "    {} ({}{})",
            dim.name,
            dim.length,
            if dim.is_unlimited { ", unlimited" } else { "" }
        );
    }
    println!("  Variables:");
    for var in &info.variables {
        println!(
            "    {} ({}) - dimensions: [{}]",
            var.name,
            var.data_type,
            var.dimensions.join(", ")
        );
        for (name, value) in &var.attributes {
            println!("      @{}: {}", name, value);
        }
    }
    if !info.global_attributes.is_empty() {
        println!("  Global Attributes:");
        for (name, value) in &info.global_attributes {
            println!("    @{}: {}", name, value);
        }
    }
}

pub fn print_info_json(info: &DatasetInfo) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(info)?);
    Ok(())
}

pub fn print_info_yaml(info: &DatasetInfo) -> Result<()> {
    let yaml = serde_yaml::to_string(info).context("Failed to serialize dataset info to YAML")?;
    println!("{}", yaml);
    Ok(())
}
