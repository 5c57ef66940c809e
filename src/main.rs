use chrono::{Datelike, Local};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use sales_etl::app::batch_use_case::BatchEtlUseCase;
use sales_etl::app::stream_use_case::StreamingEtlUseCase;
use sales_etl::config::Config;
use sales_etl::logging;
use sales_etl::observability::metrics;
use sales_etl::pipeline::ingestion::CsvLoader;
use sales_etl::pipeline::streaming::{DirectorySource, ProcessedLedger};

#[derive(Parser)]
#[command(name = "sales_etl")]
#[command(about = "Batch and streaming ETL for retail sales records")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Write a Prometheus text snapshot of the run metrics to this file
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean one CSV file into another
    Batch {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Skip the profiling printout
        #[arg(long)]
        no_profile: bool,
    },
    /// Watch a directory and process new CSV files as micro-batches
    Stream {
        #[arg(long)]
        input_dir: Option<PathBuf>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
        #[arg(long)]
        poll_interval_ms: Option<u64>,
        /// Stop after this many consecutive polls without new files
        #[arg(long)]
        max_idle_polls: Option<u32>,
    },
    /// Print the profile of a CSV file without cleaning it
    Profile {
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

fn write_metrics(path: &Path) {
    match metrics::render() {
        Some(text) => {
            if let Err(e) = fs::write(path, text) {
                warn!("Could not write metrics to {}: {}", path.display(), e);
            }
        }
        None => warn!("Metrics recorder not installed, nothing to write"),
    }
}

async fn run(cli: Cli, mut config: Config) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Batch {
            input,
            output,
            no_profile,
        } => {
            let input = input.unwrap_or_else(|| config.batch.input.clone());
            let output = output.unwrap_or_else(|| config.batch.output.clone());
            if no_profile {
                config.batch.profile = false;
            }

            println!("🔄 Running batch ETL on {}...", input.display());
            let use_case = BatchEtlUseCase::from_config(&config)?;
            match use_case.run(&input, &output) {
                Ok(summary) => {
                    println!("✅ {} rows saved to {}", summary.rows_written, summary.output.display());
                    Ok(true)
                }
                Err(e) => {
                    error!("Batch ETL failed: {:#}", e);
                    println!("❌ Batch ETL failed: {:#}", e);
                    Ok(false)
                }
            }
        }
        Commands::Stream {
            input_dir,
            output_dir,
            checkpoint_dir,
            poll_interval_ms,
            max_idle_polls,
        } => {
            let input_dir = input_dir.unwrap_or_else(|| config.stream.input_dir.clone());
            let output_dir = output_dir.unwrap_or_else(|| config.stream.output_dir.clone());
            let checkpoint_dir = checkpoint_dir.unwrap_or_else(|| config.stream.checkpoint_dir.clone());
            if let Some(ms) = poll_interval_ms {
                config.stream.poll_interval_ms = ms;
            }
            if max_idle_polls.is_some() {
                config.stream.max_idle_polls = max_idle_polls;
            }

            println!("🚀 Streaming {} -> {}", input_dir.display(), output_dir.display());
            let ledger = ProcessedLedger::open(&checkpoint_dir)?;
            info!(already_processed = ledger.len(), "Processed-file ledger loaded");
            let source = DirectorySource::new(&input_dir, CsvLoader::new(config.stream.parse_mode), ledger)
                .with_settle_window(Duration::from_millis(config.stream.settle_ms));
            let use_case = StreamingEtlUseCase::with_default_sinks(&config, &output_dir, Local::now().year())?;

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl-C received");
                    let _ = shutdown_tx.send(true);
                }
            });

            let outcome = use_case.run(source, shutdown_rx).await;
            if let Ok(stats) = &outcome.producer {
                println!(
                    "📊 {} micro-batches, {} files processed, {} files skipped",
                    stats.batches, stats.files, stats.failed_files
                );
            }
            if outcome.is_success() {
                println!("✅ Streaming stopped cleanly");
            } else {
                for failure in outcome.failures() {
                    println!("❌ {}", failure);
                }
            }
            Ok(outcome.is_success())
        }
        Commands::Profile { input } => {
            let input = input.unwrap_or_else(|| config.batch.input.clone());
            let use_case = BatchEtlUseCase::from_config(&config)?;
            match use_case.profile(&input) {
                Ok(profile) => {
                    println!("{}", profile);
                    Ok(true)
                }
                Err(e) => {
                    error!("Profiling failed: {:#}", e);
                    println!("❌ Profiling failed: {:#}", e);
                    Ok(false)
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = logging::init_logging(&config.logging);

    let metrics_out = cli.metrics_out.clone();
    if metrics_out.is_some() {
        if let Err(e) = metrics::init() {
            warn!("Failed to install metrics recorder: {}", e);
        }
    }

    let result = run(cli, config).await;

    if let Some(path) = &metrics_out {
        write_metrics(path);
    }

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            println!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}
