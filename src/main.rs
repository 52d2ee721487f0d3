//! DataPipe - Main Entry Point
//!
//! Loads a pipeline config, then either prints the pipeline layout or runs
//! it to completion.
//!
//! ```text
//! datapipe [CONFIG] [--describe] [--report <PATH>]
//! ```
//!
//! Without `CONFIG` the default config location is used.

use anyhow::Context;
use clap::Parser;
use datapipe_rs::{
    config::{default_config_path, AppConfig, LoggingConfig},
    RunReport,
};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Run a staged data pipeline from a config file.
#[derive(Parser)]
#[command(name = "datapipe", version)]
struct Args {
    /// Pipeline config (.toml or .json); defaults to the user config location
    config: Option<PathBuf>,

    /// Print the pipeline layout and exit without running it
    #[arg(long)]
    describe: bool,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

/// Install the subscriber. The returned guard flushes the log file on drop.
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .context("invalid log filter")?;

    let (file_layer, guard) = match &logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .with_context(|| format!("log file {:?} has no file name", path))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path().context("could not determine config directory")?,
    };
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("failed to load {:?}", config_path))?;

    let _guard = init_logging(&config.logging)?;
    tracing::info!("Starting DataPipe with {:?}", config_path);

    let pipeline = config.build_pipeline().context("failed to build pipeline")?;

    if args.describe {
        print!("{}", pipeline.describe());
        return Ok(());
    }

    let started_at = chrono::Utc::now();
    let result = pipeline.run();
    let report = RunReport::from_result(started_at, &result);

    if let Some(path) = &args.report {
        report
            .save(path)
            .with_context(|| format!("failed to write report {:?}", path))?;
        tracing::info!("Report written to {:?}", path);
    }

    let output = result.context("pipeline run failed")?;
    tracing::info!(
        "Done: {} data buffers, {} rows in {} ms",
        report.buffers,
        report.rows,
        report.elapsed_ms()
    );
    for summary in &output.summaries {
        println!(
            "{:<20} buffers={:<8} rows={:<10} epochs={}",
            summary.name, summary.buffers, summary.rows, summary.epochs
        );
    }

    Ok(())
}
