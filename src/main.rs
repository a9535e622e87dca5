use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::process::ExitCode;
use std::time::Instant;

use cmip6_subset::catalog::{Catalog, FacetQuery};
use cmip6_subset::cli::{
    Cli, Commands, ReportFormat, generate_completions, generate_template, load_config,
    write_or_print,
};
use cmip6_subset::info::{get_dataset_info, print_info_human, print_info_json, print_info_yaml};
use cmip6_subset::input::CatalogConfig;
use cmip6_subset::log::{
    config_echo, show_farewell_with_timing, show_greeting, show_outcome, show_resolution,
    show_sweep_summary,
};
use cmip6_subset::sweep::run_sweep;
use cmip6_subset::window::{CandidateFile, resolve};
use cmip6_subset::{YearOutcome, build_catalog, catalog_for, process_year};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn print_structured<T: serde::Serialize>(value: &T, format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        ReportFormat::Yaml => println!("{}", serde_yaml::to_string(value)?),
        ReportFormat::Human => {}
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<u8> {
    let human = cli.output_format == ReportFormat::Human && !cli.quiet;
    let start_time = Instant::now();

    match &cli.command {
        Commands::Extract(args) => {
            let base = cli.config.as_deref().map(load_config).transpose()?;
            let config = args.to_job_config(base.as_ref());
            config.validate()?;

            if human {
                show_greeting("command line");
                config_echo(&config);
            }
            let catalog = build_catalog(&config)?;
            let outcome = process_year(&config, catalog.as_ref(), args.year, human).await?;

            if human {
                show_outcome(&outcome);
                show_farewell_with_timing(start_time.elapsed());
            } else {
                print_structured(&outcome, cli.output_format)?;
            }
            Ok(match outcome {
                YearOutcome::EmptySubset { .. } => 2,
                _ => 0,
            })
        }

        Commands::Sweep(args) => {
            let path = cli
                .config
                .as_deref()
                .ok_or_else(|| {
                    anyhow!("sweep needs a configuration file (--config or CMIP6_SUBSET_CONFIG)")
                })?;
            let config = args.apply(load_config(path)?);
            config.validate()?;

            if human {
                show_greeting(&path.display().to_string());
                config_echo(&config);
            }
            let catalog = build_catalog(&config)?;
            let report = run_sweep(&config, catalog.as_ref(), config.years, human).await?;

            if human {
                for year in &report.years {
                    if let Ok(outcome) = &year.result {
                        show_outcome(outcome);
                    }
                }
                show_sweep_summary(&report);
                show_farewell_with_timing(report.elapsed);
            } else {
                let outcomes: Vec<_> = report
                    .years
                    .iter()
                    .filter_map(|y| y.result.as_ref().ok())
                    .collect();
                print_structured(&outcomes, cli.output_format)?;
            }
            Ok(report.exit_code() as u8)
        }

        Commands::Resolve {
            start_year,
            end_year,
            length,
            frequency,
            year,
        } => {
            let file = CandidateFile::new(*start_year, *end_year, *length);
            let window = resolve(&file, *frequency, *year);
            if cli.output_format == ReportFormat::Human {
                show_resolution(&file, *frequency, *year, window);
            } else {
                print_structured(&window, cli.output_format)?;
            }
            Ok(0)
        }

        Commands::Search {
            model,
            scenario,
            variable,
            frequency,
            variant,
            catalog,
        } => {
            let base = match cli.config.as_deref().map(load_config).transpose()? {
                Some(config) => config.catalog,
                None => CatalogConfig::default(),
            };
            let catalog_config = catalog.apply(base);
            let data_node = match &catalog_config {
                CatalogConfig::Esgf { data_node, .. } => data_node.clone(),
                CatalogConfig::Directory { .. } => None,
            };
            let query = FacetQuery::new(model, scenario, variable, *frequency)
                .with_variant(variant)
                .with_data_node(data_node);

            let files = catalog_for(&catalog_config)?.search(&query).await?;

            if cli.output_format == ReportFormat::Human {
                println!("{} files for {}", files.len(), query.file_prefix());
                for file in &files {
                    let span = file
                        .year_span()
                        .map(|(a, b)| format!("{}-{}", a, b))
                        .unwrap_or_else(|| "?".to_string());
                    println!("  [{}] {}", span, file.name);
                    println!("      {}", file.access);
                }
            } else {
                print_structured(&files, cli.output_format)?;
            }
            Ok(0)
        }

        Commands::Info {
            file,
            detailed,
            variable,
        } => {
            let info = get_dataset_info(file, variable.as_deref(), *detailed).await?;
            match cli.output_format {
                ReportFormat::Human => print_info_human(&info),
                ReportFormat::Json => print_info_json(&info)?,
                ReportFormat::Yaml => print_info_yaml(&info)?,
            }
            Ok(0)
        }

        Commands::Template { output, format } => {
            let rendered = generate_template(*format)?;
            write_or_print(&rendered, output.as_deref())
                .context("Failed to write configuration template")?;
            Ok(0)
        }

        Commands::Completions { shell, output } => {
            generate_completions(*shell, output.as_deref())?;
            Ok(0)
        }
    }
}
