use std::time::Duration;

use crate::YearOutcome;
use crate::input::JobConfig;
use crate::sweep::SweepReport;
use crate::window::{CandidateFile, Frequency, TimeIndexRange};

pub fn show_greeting(source: &str) {
    println!("=== CMIP6 Regional Subset ===");
    println!("Configuration from: {}", source);
}

pub fn config_echo(config: &JobConfig) {
    println!("\nRequest:");
    println!("  Model: {}", config.model);
    println!("  Scenario: {}", config.scenario);
    println!(
        "  Variable: {} ({} data)",
        config.variable,
        config.frequency.describe()
    );
    println!("  Years: {}-{}", config.years.start, config.years.end);
    println!("  Zone: {} ({})", config.region.name, config.region.bbox);
    println!("  Output: {} [{}]", config.output_dir, config.output_format);
}

pub fn show_outcome(outcome: &YearOutcome) {
    match outcome {
        YearOutcome::Written(written) => {
            println!(
                "\n{}: time indices {} of {}",
                written.year, written.window, written.source
            );
            println!("  Saved {}", written.output);
            if !written.year_verified {
                println!("  Warning: time stamps do not all fall in {}", written.year);
            }
        }
        YearOutcome::NoMatch { year, scanned } => {
            println!(
                "\n{}: no file among {} listed covers this year. Try again later; remote availability varies.",
                year, scanned
            );
        }
        YearOutcome::EmptySubset {
            year,
            source,
            lat_len,
            lon_len,
        } => {
            println!(
                "\n{}: the zone selects {} latitudes x {} longitudes in {}; nothing written.",
                year, lat_len, lon_len, source
            );
        }
    }
}

pub fn show_sweep_summary(report: &SweepReport) {
    println!("\nSweep summary:");
    println!("  Years processed: {}", report.years.len());
    println!("  Written: {}", report.written());
    println!("  No match: {}", report.no_match());
    println!("  Empty subsets: {}", report.empty());
    println!("  Failed: {}", report.failed());
    println!("  Source files fetched: {}", report.sources_fetched);
    for year in &report.years {
        if let Err(e) = &year.result {
            println!("    {}: {}", year.year, e);
        }
    }
}

pub fn show_resolution(
    file: &CandidateFile,
    frequency: Frequency,
    year: i32,
    window: Option<TimeIndexRange>,
) {
    match window {
        Some(window) => println!(
            "{} {} in a {}-{} file of {} samples: indices {} ({} samples)",
            frequency.describe(),
            year,
            file.start_year,
            file.end_year,
            file.time_axis_length,
            window,
            window.len()
        ),
        None => println!(
            "{} is outside the {}-{} file",
            year, file.start_year, file.end_year
        ),
    }
}

pub fn show_farewell_with_timing(elapsed: Duration) {
    println!("\n=== Done in {:.2?} ===", elapsed);
}
