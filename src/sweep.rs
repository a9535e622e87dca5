//! # Multi-Year Sweeps
//!
//! Runs [`process_year`] for every year of a span inside one process. Years are
//! independent: each writes only its own output file, so they can run
//! concurrently with at most `jobs` in flight. A failing year does not stop the
//! others; every result is kept in the [`SweepReport`].
//!
//! The catalog is listed once per sweep and each source file is fetched once,
//! however many years it covers.

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::catalog::Catalog;
use crate::error::{SubsetError, SubsetResult};
use crate::input::{JobConfig, YearSpan};
use crate::storage::SourceCache;
use crate::{YearOutcome, process_listed_year};

/// Result of one year within a sweep.
#[derive(Debug)]
pub struct YearReport {
    pub year: i32,
    pub result: SubsetResult<YearOutcome>,
}

#[derive(Debug)]
pub struct SweepReport {
    pub years: Vec<YearReport>,
    pub elapsed: Duration,
    /// Source files materialized during the sweep
    pub sources_fetched: usize,
}

impl SweepReport {
    fn count(&self, pred: impl Fn(&SubsetResult<YearOutcome>) -> bool) -> usize {
        self.years.iter().filter(|y| pred(&y.result)).count()
    }

    pub fn written(&self) -> usize {
        self.count(|r| matches!(r, Ok(YearOutcome::Written(_))))
    }

    pub fn no_match(&self) -> usize {
        self.count(|r| matches!(r, Ok(YearOutcome::NoMatch { .. })))
    }

    pub fn empty(&self) -> usize {
        self.count(|r| matches!(r, Ok(YearOutcome::EmptySubset { .. })))
    }

    pub fn failed(&self) -> usize {
        self.count(|r| r.is_err())
    }

    /// Process exit status: 1 if any year failed, 2 if any subset was empty.
    pub fn exit_code(&self) -> i32 {
        if self.failed() > 0 {
            1
        } else if self.empty() > 0 {
            2
        } else {
            0
        }
    }
}

fn sweep_bar(total: usize, show_progress: bool) -> ProgressBar {
    if !show_progress {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    let template = "[{elapsed_precise}] {bar:40} {pos}/{len} years {msg}";
    if let Ok(style) = ProgressStyle::with_template(template) {
        bar.set_style(style.progress_chars("##-"));
    }
    bar
}

fn log_year(report: &YearReport) {
    match &report.result {
        Ok(YearOutcome::Written(written)) => info!("{}: wrote {}", report.year, written.output),
        Ok(YearOutcome::NoMatch { .. }) => warn!("{}: no file covers this year", report.year),
        Ok(YearOutcome::EmptySubset { source, .. }) => {
            warn!("{}: region selects no grid points in {}", report.year, source)
        }
        Err(e) => warn!("{}: {}", report.year, e),
    }
}

/// Processes every year of `years`, `config.jobs` at a time.
pub async fn run_sweep(
    config: &JobConfig,
    catalog: &dyn Catalog,
    years: YearSpan,
    show_progress: bool,
) -> SubsetResult<SweepReport> {
    config.validate()?;
    years.validate()?;

    let start = Instant::now();
    let files = Arc::new(catalog.search(&config.facet_query()).await?);
    info!("Catalog returned {} files for {}-{}", files.len(), years.start, years.end);

    // Download bars only make sense when years run one after another.
    let sources = Arc::new(SourceCache::new(show_progress && config.jobs <= 1));
    let bar = sweep_bar(years.count(), show_progress);
    let mut reports = Vec::with_capacity(years.count());

    if config.jobs <= 1 {
        for year in years.years() {
            bar.set_message(year.to_string());
            let result = process_listed_year(config, &files, year, &sources).await;
            let report = YearReport { year, result };
            log_year(&report);
            reports.push(report);
            bar.inc(1);
        }
    } else {
        let semaphore = Arc::new(Semaphore::new(config.jobs));
        let shared = Arc::new(config.clone());
        let mut tasks = JoinSet::new();

        for year in years.years() {
            let semaphore = semaphore.clone();
            let config = shared.clone();
            let files = files.clone();
            let sources = sources.clone();
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => process_listed_year(&config, &files, year, &sources).await,
                    Err(e) => Err(SubsetError::Io(std::io::Error::other(e))),
                };
                YearReport { year, result }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let report = joined?;
            log_year(&report);
            reports.push(report);
            bar.inc(1);
        }
        reports.sort_by_key(|r| r.year);
    }

    bar.finish_and_clear();
    Ok(SweepReport {
        years: reports,
        elapsed: start.elapsed(),
        sources_fetched: sources.fetches(),
    })
}
