//! End-to-end tests over NetCDF files generated on the fly.
//!
//! Fixtures mimic a CMIP6 monthly surface temperature file: `tas(time, lat, lon)`
//! with a mid-month `time` axis in "days since 2015-01-01". Every grid cell of
//! time step `t` holds the value `t`, so the written subset tells which time
//! indices were kept.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::catalog::DirectoryCatalog;
use crate::geo::GeoBox;
use crate::input::{CatalogConfig, JobConfig, Region, YearSpan};
use crate::output::OutputFormat;
use crate::window::Frequency;
use crate::{YearOutcome, process_year};

const FIXTURE_NAME: &str = "tas_Amon_MPI-ESM1-2-HR_ssp370_r1i1p1f1_gn_201501-205412.nc";

/// Latitudes -89, -87, ..., 89.
fn global_lats() -> Vec<f64> {
    (0..90).map(|i| -89.0 + 2.0 * i as f64).collect()
}

/// Longitudes 0, 2, ..., 358.
fn positive_lons() -> Vec<f64> {
    (0..180).map(|i| 2.0 * i as f64).collect()
}

/// Mid-month offsets in days from 2015-01-01.
fn monthly_time_axis(start_year: i32, end_year: i32) -> Vec<f64> {
    let base = NaiveDate::from_ymd_opt(2015, 1, 1).expect("valid base date");
    (start_year..=end_year)
        .flat_map(|year| (1..=12).map(move |month| (year, month)))
        .map(|(year, month)| {
            let date = NaiveDate::from_ymd_opt(year, month, 15).expect("valid date");
            (date - base).num_days() as f64
        })
        .collect()
}

fn write_fixture(
    path: &Path,
    time: &[f64],
    lats: &[f64],
    lons: &[f64],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = netcdf::create(path)?;
    file.add_dimension("time", time.len())?;
    file.add_dimension("lat", lats.len())?;
    file.add_dimension("lon", lons.len())?;

    let mut var = file.add_variable::<f64>("time", &["time"])?;
    var.put_attribute("units", "days since 2015-01-01")?;
    var.put_attribute("calendar", "standard")?;
    var.put_attribute("axis", "T")?;
    var.put_values(time, ..)?;

    let mut var = file.add_variable::<f64>("lat", &["lat"])?;
    var.put_attribute("units", "degrees_north")?;
    var.put_values(lats, ..)?;

    let mut var = file.add_variable::<f64>("lon", &["lon"])?;
    var.put_attribute("units", "degrees_east")?;
    var.put_values(lons, ..)?;

    let cells = lats.len() * lons.len();
    let values: Vec<f32> = (0..time.len())
        .flat_map(|t| std::iter::repeat_n(t as f32, cells))
        .collect();
    let mut var = file.add_variable::<f32>("tas", &["time", "lat", "lon"])?;
    var.put_attribute("units", "K")?;
    var.put_attribute("standard_name", "air_temperature")?;
    var.put_attribute("_FillValue", 1.0e20_f32)?;
    var.put_values(&values, ..)?;

    file.add_attribute("experiment_id", "ssp370")?;
    Ok(())
}

/// Daily offsets (at noon) in days from 2015-01-01.
fn daily_time_axis(start_year: i32, end_year: i32) -> Vec<f64> {
    let base = NaiveDate::from_ymd_opt(2015, 1, 1).expect("valid base date");
    let first = NaiveDate::from_ymd_opt(start_year, 1, 1).expect("valid date");
    let last = NaiveDate::from_ymd_opt(end_year, 12, 31).expect("valid date");
    first
        .iter_days()
        .take_while(|day| *day <= last)
        .map(|day| (day - base).num_days() as f64 + 0.5)
        .collect()
}

/// A catalog directory of CMIP6-named fixtures, plus an empty output directory.
struct Workspace {
    _root: TempDir,
    catalog_dir: PathBuf,
    output_dir: PathBuf,
}

impl Workspace {
    fn empty() -> Result<Self, Box<dyn std::error::Error>> {
        let root = TempDir::new()?;
        let catalog_dir = root.path().join("mirror");
        let output_dir = root.path().join("out");
        std::fs::create_dir_all(&catalog_dir)?;
        Ok(Workspace {
            _root: root,
            catalog_dir,
            output_dir,
        })
    }

    /// Holds the single 2015-2054 monthly file.
    fn new(lats: &[f64], lons: &[f64]) -> Result<Self, Box<dyn std::error::Error>> {
        let ws = Self::empty()?;
        ws.add_file(FIXTURE_NAME, &monthly_time_axis(2015, 2054), lats, lons)?;
        Ok(ws)
    }

    fn add_file(
        &self,
        name: &str,
        time: &[f64],
        lats: &[f64],
        lons: &[f64],
    ) -> Result<(), Box<dyn std::error::Error>> {
        write_fixture(&self.catalog_dir.join(name), time, lats, lons)
    }

    fn global() -> Result<Self, Box<dyn std::error::Error>> {
        Self::new(&global_lats(), &positive_lons())
    }

    fn config(&self, region: Region, years: YearSpan) -> JobConfig {
        JobConfig {
            model: "MPI-ESM1-2-HR".to_string(),
            scenario: "ssp370".to_string(),
            variable: "tas".to_string(),
            frequency: Frequency::Monthly,
            variant_label: "r1i1p1f1".to_string(),
            years,
            region,
            output_dir: self.output_dir.to_string_lossy().into_owned(),
            output_format: OutputFormat::NetCdf,
            catalog: CatalogConfig::Directory {
                path: self.catalog_dir.to_string_lossy().into_owned(),
            },
            access: Default::default(),
            jobs: 1,
        }
    }

    fn catalog(&self) -> DirectoryCatalog {
        DirectoryCatalog::new(&self.catalog_dir)
    }

    fn written_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.output_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

fn latinoamerica() -> Region {
    Region {
        name: "Latinoamerica".to_string(),
        bbox: GeoBox::new(-90.0, -30.0, -60.0, 20.0),
    }
}

fn read_f64(file: &netcdf::File, name: &str) -> Result<Vec<f64>, Box<dyn std::error::Error>> {
    let var = file.variable(name).ok_or("missing variable")?;
    Ok(var.get_values::<f64, _>(..)?)
}

mod pipeline_tests {
    use super::*;

    #[tokio::test]
    async fn test_year_2050_latinoamerica() -> Result<(), Box<dyn std::error::Error>> {
        let ws = Workspace::global()?;
        let config = ws.config(latinoamerica(), YearSpan::single(2050));

        let outcome = process_year(&config, &ws.catalog(), 2050, false).await?;
        let YearOutcome::Written(written) = outcome else {
            panic!("expected a written subset, got {:?}", outcome);
        };

        assert_eq!(written.source, FIXTURE_NAME);
        assert_eq!(written.window.start, 420);
        assert_eq!(written.window.end, 432);
        assert!(written.year_verified);
        // lat -59..19 step 2, lon 270..330 step 2
        assert_eq!(written.shape, vec![12, 40, 31]);
        assert!(
            written
                .output
                .ends_with("tas_mon_ssp370_MPI-ESM1-2-HR_2050_Latinoamerica.nc")
        );
        assert_eq!(
            ws.written_files(),
            vec!["tas_mon_ssp370_MPI-ESM1-2-HR_2050_Latinoamerica.nc"]
        );

        let file = netcdf::open(&written.output)?;
        let lons = read_f64(&file, "lon")?;
        assert!(lons.iter().all(|lon| (270.0..=330.0).contains(lon)));
        let lats = read_f64(&file, "lat")?;
        assert!(lats.iter().all(|lat| (-60.0..=20.0).contains(lat)));
        assert_eq!(read_f64(&file, "time")?.len(), 12);

        let tas = file.variable("tas").ok_or("missing tas")?;
        let values = tas.get_values::<f32, _>(..)?;
        let per_step = 40 * 31;
        assert_eq!(values.len(), 12 * per_step);
        for (step, chunk) in values.chunks(per_step).enumerate() {
            let expected = (420 + step) as f32;
            assert!(chunk.iter().all(|v| *v == expected));
        }

        match file.attribute("zone").map(|a| a.value()).transpose()? {
            Some(netcdf::AttributeValue::Str(zone)) => assert_eq!(zone, "Latinoamerica"),
            other => panic!("unexpected zone attribute {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_rerun_replaces_output() -> Result<(), Box<dyn std::error::Error>> {
        let ws = Workspace::global()?;
        let config = ws.config(latinoamerica(), YearSpan::single(2050));
        let catalog = ws.catalog();

        let first = process_year(&config, &catalog, 2050, false).await?;
        let YearOutcome::Written(first) = first else {
            panic!("first run wrote nothing");
        };
        let first_values = netcdf::open(&first.output)?
            .variable("tas")
            .ok_or("missing tas")?
            .get_values::<f32, _>(..)?;

        let second = process_year(&config, &catalog, 2050, false).await?;
        let YearOutcome::Written(second) = second else {
            panic!("second run wrote nothing");
        };
        assert_eq!(first.output, second.output);
        assert_eq!(first.window, second.window);

        let second_values = netcdf::open(&second.output)?
            .variable("tas")
            .ok_or("missing tas")?
            .get_values::<f32, _>(..)?;
        assert_eq!(first_values, second_values);
        assert_eq!(ws.written_files().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_year_outside_catalog_is_no_match() -> Result<(), Box<dyn std::error::Error>> {
        let ws = Workspace::global()?;
        let config = ws.config(latinoamerica(), YearSpan::single(2060));

        let outcome = process_year(&config, &ws.catalog(), 2060, false).await?;
        assert_eq!(
            outcome,
            YearOutcome::NoMatch {
                year: 2060,
                scanned: 1
            }
        );
        assert!(ws.written_files().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_box_outside_grid_is_empty_subset() -> Result<(), Box<dyn std::error::Error>> {
        let tropics: Vec<f64> = (0..31).map(|i| -30.0 + 2.0 * i as f64).collect();
        let ws = Workspace::new(&tropics, &positive_lons())?;
        let region = Region {
            name: "Norte".to_string(),
            bbox: GeoBox::new(-90.0, -30.0, 40.0, 60.0),
        };
        let config = ws.config(region, YearSpan::single(2050));

        let outcome = process_year(&config, &ws.catalog(), 2050, false).await?;
        match outcome {
            YearOutcome::EmptySubset {
                year,
                source,
                lat_len,
                lon_len,
            } => {
                assert_eq!(year, 2050);
                assert_eq!(source, FIXTURE_NAME);
                assert_eq!(lat_len, 0);
                assert_eq!(lon_len, 31);
            }
            other => panic!("expected an empty subset, got {:?}", other),
        }
        assert!(ws.written_files().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_parquet_output() -> Result<(), Box<dyn std::error::Error>> {
        use polars::prelude::*;

        let ws = Workspace::global()?;
        let mut config = ws.config(latinoamerica(), YearSpan::single(2020));
        config.output_format = OutputFormat::Parquet;

        let outcome = process_year(&config, &ws.catalog(), 2020, false).await?;
        let YearOutcome::Written(written) = outcome else {
            panic!("expected a written subset");
        };
        assert!(
            written
                .output
                .ends_with("tas_mon_ssp370_MPI-ESM1-2-HR_2020_Latinoamerica.parquet")
        );

        let df = ParquetReader::new(std::fs::File::open(&written.output)?).finish()?;
        assert_eq!(df.height(), 12 * 40 * 31);
        let tas = df.column("tas")?.f32()?;
        assert_eq!(tas.min(), Some(60.0));
        assert_eq!(tas.max(), Some(71.0));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_region_is_rejected_before_search() {
        let ws = Workspace::global().expect("fixture");
        let region = Region {
            name: "Backwards".to_string(),
            bbox: GeoBox::new(-30.0, -90.0, -60.0, 20.0),
        };
        let config = ws.config(region, YearSpan::single(2050));

        let result = process_year(&config, &ws.catalog(), 2050, false).await;
        assert!(matches!(result, Err(crate::error::SubsetError::Config(_))));
        assert!(ws.written_files().is_empty());
    }

    #[tokio::test]
    async fn test_unnamed_files_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let ws = Workspace::global()?;
        std::fs::write(
            ws.catalog_dir
                .join("tas_Amon_MPI-ESM1-2-HR_ssp370_r1i1p1f1_gn_latest.nc"),
            b"not netcdf",
        )?;
        let config = ws.config(latinoamerica(), YearSpan::single(2050));

        let outcome = process_year(&config, &ws.catalog(), 2050, false).await?;
        assert!(matches!(outcome, YearOutcome::Written(_)));
        Ok(())
    }
}

mod scan_tests {
    use super::*;

    const EARLY: &str = "tas_Amon_MPI-ESM1-2-HR_ssp370_r1i1p1f1_gn_201501-203412.nc";
    const LATE: &str = "tas_Amon_MPI-ESM1-2-HR_ssp370_r1i1p1f1_gn_203501-205412.nc";
    const DAILY: &str = "tas_day_MPI-ESM1-2-HR_ssp370_r1i1p1f1_gn_20190101-20211231.nc";

    /// Latitudes -80, -60, ..., 80.
    fn coarse_lats() -> Vec<f64> {
        (0..9).map(|i| -80.0 + 20.0 * i as f64).collect()
    }

    /// Longitudes 0, 20, ..., 340.
    fn coarse_lons() -> Vec<f64> {
        (0..18).map(|i| 20.0 * i as f64).collect()
    }

    fn split_catalog() -> Result<Workspace, Box<dyn std::error::Error>> {
        let ws = Workspace::empty()?;
        ws.add_file(EARLY, &monthly_time_axis(2015, 2034), &global_lats(), &positive_lons())?;
        ws.add_file(LATE, &monthly_time_axis(2035, 2054), &global_lats(), &positive_lons())?;
        Ok(ws)
    }

    #[tokio::test]
    async fn test_earlier_file_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let ws = split_catalog()?;
        let config = ws.config(latinoamerica(), YearSpan::single(2050));

        let outcome = process_year(&config, &ws.catalog(), 2050, false).await?;
        let YearOutcome::Written(written) = outcome else {
            panic!("expected a written subset, got {:?}", outcome);
        };

        assert_eq!(written.source, LATE);
        assert_eq!(written.window.start, 180);
        assert_eq!(written.window.end, 192);
        assert!(written.year_verified);
        assert_eq!(written.shape, vec![12, 40, 31]);

        let values = netcdf::open(&written.output)?
            .variable("tas")
            .ok_or("missing tas")?
            .get_values::<f32, _>(..)?;
        assert_eq!(values.first(), Some(&180.0));
        assert_eq!(values.last(), Some(&191.0));
        Ok(())
    }

    #[tokio::test]
    async fn test_first_file_covers_its_last_year() -> Result<(), Box<dyn std::error::Error>> {
        let ws = split_catalog()?;
        let config = ws.config(latinoamerica(), YearSpan::single(2034));

        let outcome = process_year(&config, &ws.catalog(), 2034, false).await?;
        let YearOutcome::Written(written) = outcome else {
            panic!("expected a written subset, got {:?}", outcome);
        };
        assert_eq!(written.source, EARLY);
        assert_eq!((written.window.start, written.window.end), (228, 240));
        Ok(())
    }

    #[tokio::test]
    async fn test_daily_leap_year() -> Result<(), Box<dyn std::error::Error>> {
        let ws = Workspace::empty()?;
        let time = daily_time_axis(2019, 2021);
        assert_eq!(time.len(), 1096);
        ws.add_file(DAILY, &time, &coarse_lats(), &coarse_lons())?;

        let mut config = ws.config(latinoamerica(), YearSpan::single(2020));
        config.frequency = Frequency::Daily;

        let outcome = process_year(&config, &ws.catalog(), 2020, false).await?;
        let YearOutcome::Written(written) = outcome else {
            panic!("expected a written subset, got {:?}", outcome);
        };

        assert_eq!(written.source, DAILY);
        assert_eq!((written.window.start, written.window.end), (365, 731));
        assert!(written.year_verified);
        // lat -60..20 step 20, lon 280..320 step 20
        assert_eq!(written.shape, vec![366, 5, 3]);
        assert!(
            written
                .output
                .ends_with("tas_day_ssp370_MPI-ESM1-2-HR_2020_Latinoamerica.nc")
        );

        let values = netcdf::open(&written.output)?
            .variable("tas")
            .ok_or("missing tas")?
            .get_values::<f32, _>(..)?;
        assert_eq!(values.first(), Some(&365.0));
        assert_eq!(values.last(), Some(&730.0));
        Ok(())
    }

    #[tokio::test]
    async fn test_daily_last_year_runs_to_axis_end() -> Result<(), Box<dyn std::error::Error>> {
        let ws = Workspace::empty()?;
        ws.add_file(DAILY, &daily_time_axis(2019, 2021), &coarse_lats(), &coarse_lons())?;
        let mut config = ws.config(latinoamerica(), YearSpan::single(2021));
        config.frequency = Frequency::Daily;

        let outcome = process_year(&config, &ws.catalog(), 2021, false).await?;
        let YearOutcome::Written(written) = outcome else {
            panic!("expected a written subset, got {:?}", outcome);
        };
        assert_eq!((written.window.start, written.window.end), (731, 1096));
        assert_eq!(written.shape, vec![365, 5, 3]);
        Ok(())
    }
}

mod extract_tests {
    use super::*;
    use crate::extract::{extract, time_axis_length};
    use crate::geo::LongitudeConvention;
    use crate::window::TimeIndexRange;

    fn fixture(
        dir: &TempDir,
        lats: &[f64],
        lons: &[f64],
    ) -> Result<netcdf::File, Box<dyn std::error::Error>> {
        let path = dir.path().join("fixture.nc");
        write_fixture(&path, &monthly_time_axis(2015, 2016), lats, lons)?;
        Ok(netcdf::open(&path)?)
    }

    #[test]
    fn test_descending_latitudes() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let lats: Vec<f64> = global_lats().into_iter().rev().collect();
        let file = fixture(&dir, &lats, &positive_lons())?;

        let bbox = GeoBox::new(-90.0, -30.0, -60.0, 20.0);
        let subset = extract(&file, "tas", TimeIndexRange::new(12, 24), &bbox)?;

        assert_eq!(subset.lat.values.len(), 40);
        assert_eq!(subset.lat.values.first(), Some(&19.0));
        assert_eq!(subset.lat.values.last(), Some(&-59.0));
        assert_eq!(subset.values.len(), 12 * 40 * 31);
        assert_eq!(subset.values.first(), Some(&12.0));
        Ok(())
    }

    #[test]
    fn test_signed_longitudes_are_not_shifted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let lons: Vec<f64> = (0..180).map(|i| -180.0 + 2.0 * i as f64).collect();
        let file = fixture(&dir, &global_lats(), &lons)?;

        let bbox = GeoBox::new(-90.0, -30.0, -60.0, 20.0);
        let subset = extract(&file, "tas", TimeIndexRange::new(0, 12), &bbox)?;

        assert_eq!(subset.convention, LongitudeConvention::Signed);
        assert_eq!(subset.lon.values.first(), Some(&-90.0));
        assert_eq!(subset.lon.values.last(), Some(&-30.0));
        assert_eq!(subset.shape(), vec![12, 40, 31]);
        Ok(())
    }

    #[test]
    fn test_eastern_box_on_positive_grid() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let file = fixture(&dir, &global_lats(), &positive_lons())?;

        let bbox = GeoBox::new(10.0, 40.0, 0.0, 10.0);
        let subset = extract(&file, "tas", TimeIndexRange::new(0, 12), &bbox)?;

        assert_eq!(subset.convention, LongitudeConvention::Positive);
        assert_eq!(subset.lon.values.first(), Some(&10.0));
        assert_eq!(subset.lon.values.last(), Some(&40.0));
        Ok(())
    }

    #[test]
    fn test_greenwich_box_is_clipped_on_positive_grid() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let file = fixture(&dir, &global_lats(), &positive_lons())?;

        let bbox = GeoBox::new(-20.0, 20.0, 0.0, 10.0);
        let subset = extract(&file, "tas", TimeIndexRange::new(0, 12), &bbox)?;

        assert!(subset.lon_clipped);
        assert_eq!(subset.lon.values.first(), Some(&340.0));
        assert_eq!(subset.lon.values.last(), Some(&358.0));

        let western = GeoBox::new(-90.0, -30.0, 0.0, 10.0);
        let subset = extract(&file, "tas", TimeIndexRange::new(0, 12), &western)?;
        assert!(!subset.lon_clipped);
        Ok(())
    }

    #[test]
    fn test_time_axis_length() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let file = fixture(&dir, &global_lats(), &positive_lons())?;
        assert_eq!(time_axis_length(&file, "tas")?, 24);
        assert!(time_axis_length(&file, "pr").is_err());
        Ok(())
    }

    #[test]
    fn test_missing_variable() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let file = fixture(&dir, &global_lats(), &positive_lons())?;
        let bbox = GeoBox::new(-90.0, -30.0, -60.0, 20.0);
        let result = extract(&file, "pr", TimeIndexRange::new(0, 12), &bbox);
        assert!(matches!(result, Err(crate::error::SubsetError::MissingVariable(_))));
        Ok(())
    }
}

mod sweep_tests {
    use super::*;
    use crate::catalog::{Catalog, CatalogError, FacetQuery, FileDescriptor};
    use crate::sweep::run_sweep;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Directory catalog that counts how often it is searched.
    struct CountingCatalog {
        inner: DirectoryCatalog,
        searches: AtomicUsize,
    }

    impl CountingCatalog {
        fn new(ws: &Workspace) -> Self {
            CountingCatalog {
                inner: ws.catalog(),
                searches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Catalog for CountingCatalog {
        async fn search(&self, query: &FacetQuery) -> Result<Vec<FileDescriptor>, CatalogError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            self.inner.search(query).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_sweep_across_catalog_end() -> Result<(), Box<dyn std::error::Error>> {
        let ws = Workspace::global()?;
        let years = YearSpan {
            start: 2053,
            end: 2056,
        };
        let mut config = ws.config(latinoamerica(), years);
        config.jobs = 2;

        let report = run_sweep(&config, &ws.catalog(), years, false).await?;

        let order: Vec<i32> = report.years.iter().map(|y| y.year).collect();
        assert_eq!(order, vec![2053, 2054, 2055, 2056]);
        assert_eq!(report.written(), 2);
        assert_eq!(report.no_match(), 2);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(
            ws.written_files(),
            vec![
                "tas_mon_ssp370_MPI-ESM1-2-HR_2053_Latinoamerica.nc",
                "tas_mon_ssp370_MPI-ESM1-2-HR_2054_Latinoamerica.nc",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_fetches_each_source_once() -> Result<(), Box<dyn std::error::Error>> {
        let ws = Workspace::empty()?;
        ws.add_file(
            "tas_Amon_MPI-ESM1-2-HR_ssp370_r1i1p1f1_gn_201501-203412.nc",
            &monthly_time_axis(2015, 2034),
            &global_lats(),
            &positive_lons(),
        )?;
        ws.add_file(
            "tas_Amon_MPI-ESM1-2-HR_ssp370_r1i1p1f1_gn_203501-205412.nc",
            &monthly_time_axis(2035, 2054),
            &global_lats(),
            &positive_lons(),
        )?;
        let years = YearSpan {
            start: 2031,
            end: 2038,
        };
        let mut config = ws.config(latinoamerica(), years);
        config.jobs = 3;
        let catalog = CountingCatalog::new(&ws);

        let report = run_sweep(&config, &catalog, years, false).await?;

        assert_eq!(report.written(), 8);
        assert_eq!(catalog.searches.load(Ordering::SeqCst), 1);
        assert_eq!(report.sources_fetched, 2);
        assert_eq!(ws.written_files().len(), 8);
        Ok(())
    }

    #[tokio::test]
    async fn test_sequential_sweep_reports_empty_subsets()
    -> Result<(), Box<dyn std::error::Error>> {
        let tropics: Vec<f64> = (0..31).map(|i| -30.0 + 2.0 * i as f64).collect();
        let ws = Workspace::new(&tropics, &positive_lons())?;
        let years = YearSpan {
            start: 2030,
            end: 2031,
        };
        let region = Region {
            name: "Norte".to_string(),
            bbox: GeoBox::new(-90.0, -30.0, 40.0, 60.0),
        };
        let config = ws.config(region, years);
        let catalog = CountingCatalog::new(&ws);

        let report = run_sweep(&config, &catalog, years, false).await?;
        assert_eq!(report.empty(), 2);
        assert_eq!(report.exit_code(), 2);
        assert_eq!(catalog.searches.load(Ordering::SeqCst), 1);
        assert_eq!(report.sources_fetched, 1);
        assert!(ws.written_files().is_empty());
        Ok(())
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_yaml_job_roundtrip_through_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let path = dir.path().join("job.yaml");
        std::fs::write(
            &path,
            r#"
model: MPI-ESM1-2-HR
scenario: ssp370
variable: tas
frequency: mon
years: {start: 2041, end: 2060}
region: {name: Latinoamerica, lon_west: -90, lon_east: -30, lat_south: -60, lat_north: 20}
output_dir: ./cmip6
catalog: {kind: directory, path: /data/mirror}
"#,
        )?;

        let config = JobConfig::from_file(&path)?;
        config.validate()?;
        assert_eq!(config.years.count(), 20);
        assert_eq!(config.variant_label, "r1i1p1f1");
        assert_eq!(config.output_format, OutputFormat::NetCdf);
        assert_eq!(
            config.catalog,
            CatalogConfig::Directory {
                path: "/data/mirror".to_string()
            }
        );
        assert_eq!(
            config.facet_query().file_prefix(),
            "tas_Amon_MPI-ESM1-2-HR_ssp370_r1i1p1f1_"
        );
        Ok(())
    }
}
