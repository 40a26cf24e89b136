use anyhow::{Context, Result};
use clap::Parser;
use perfcause::cache::{CacheKey, CacheStore, FileCacheStore};
use perfcause::cli::{Cli, Commands};
use perfcause::command_measurer::CommandMeasurer;
use perfcause::config::{Settings, StatisticsConfig};
use perfcause::report::SearchReport;
use perfcause::searcher::LevelCauseSearcher;
use perfcause::trace_source::JsonTraceSource;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run_search(config: &Path, traces: &Path, cache: &Path, report: bool) -> Result<()> {
    let settings = Settings::from_file(config)?;
    let measurer = CommandMeasurer::new(settings.command.clone(), &settings.measurement);
    let traces = JsonTraceSource::new(traces);
    let cache = FileCacheStore::new(cache);

    let searcher = LevelCauseSearcher::new(
        settings.search.clone(),
        settings.measurement.clone(),
        &measurer,
        &traces,
        &cache,
    )?;
    let entry = searcher
        .run()
        .with_context(|| format!("Cause search for {} failed", settings.search.test_case))?;

    if report {
        let report = SearchReport::from_entry(&entry, &settings.measurement.statistics);
        print!("{}", report.to_report_string());
    } else {
        for cause in &entry.progress.causes {
            println!("{}", cause);
        }
    }
    Ok(())
}

fn run_inspect(cache: &Path, key: CacheKey, config: Option<&Path>) -> Result<()> {
    let statistics = match config {
        Some(path) => Settings::from_file(path)?.measurement.statistics,
        None => StatisticsConfig::default(),
    };

    let entry = FileCacheStore::new(cache)
        .load(&key)
        .with_context(|| format!("No usable search for {}", key.test_case))?;
    print!(
        "{}",
        SearchReport::from_entry(&entry, &statistics).to_report_string()
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    match args.command {
        Commands::Search {
            config,
            traces,
            cache,
            report,
        } => run_search(&config, &traces, &cache, report),
        Commands::Inspect {
            cache,
            new_version,
            version_old,
            test_case,
            config,
        } => run_inspect(
            &cache,
            CacheKey::new(new_version, version_old, test_case),
            config.as_deref(),
        ),
    }
}
