//! divlab CLI: dividend disclosure collection and feature pipeline.
//!
//! Commands:
//! - `run`: collect, optimize the window, build features, write artifacts
//! - `collect`: incremental collection only
//! - `checkpoint status`: report synced dates and known identifiers

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use divlab_core::domain::DateRange;
use divlab_core::filings::{CheckpointError, DartClient};
use divlab_core::net::CircuitBreaker;
use divlab_runner::pipeline::{checkpoint_store, disclosure_store, CHECKPOINT_FILE};
use divlab_runner::{
    run_collection, run_pipeline, CollectionReport, Credentials, PipelineConfig, PipelineSources,
    PipelineSummary, RunOptions, SubRangeStatus,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "divlab",
    about = "divlab CLI: OpenDART dividend disclosures to event-window features"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RangeArgs {
    /// First filing date (YYYY-MM-DD).
    #[arg(long)]
    start: String,

    /// Last filing date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    end: Option<String>,

    /// Data directory for the store, checkpoint and artifacts.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Collector worker count. Overrides the config file.
    #[arg(long)]
    workers: Option<usize>,

    /// Path to a TOML pipeline config. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// OpenDART API key.
    #[arg(long, env = "DART_API_KEY", hide_env_values = true)]
    dart_api_key: Option<String>,

    /// Embedding provider key; accepted but unused by this pipeline.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over a filing date range.
    Run {
        #[command(flatten)]
        range: RangeArgs,

        /// Offline mode: no collection, stored disclosures and price history only.
        #[arg(long, default_value_t = false)]
        offline: bool,
    },
    /// Collect disclosures incrementally without building features.
    Collect {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Checkpoint inspection.
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Report synced dates, known identifier counts and digest state.
    Status {
        /// Data directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Print the checkpoint as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Run { range, offline } => run_cmd(range, offline),
        Commands::Collect { range } => collect_cmd(range),
        Commands::Checkpoint { action } => match action {
            CheckpointAction::Status { data_dir, json } => {
                checkpoint_status(&data_dir, json).map(|()| true)
            }
        },
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn parse_date(flag: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("--{flag} must be YYYY-MM-DD, got '{value}'"))
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(p) => PipelineConfig::from_file(p)?,
        None => PipelineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn run_options(args: &RangeArgs, offline: bool) -> Result<RunOptions> {
    let today = chrono::Local::now().date_naive();
    let start = parse_date("start", &args.start)?;
    let end = match &args.end {
        Some(e) => parse_date("end", e)?,
        None => today,
    };
    if end > today {
        bail!("--end {end} is in the future");
    }
    if args.workers == Some(0) {
        bail!("--workers must be at least 1");
    }
    Ok(RunOptions {
        range: DateRange::new(start, end)?,
        data_dir: args.data_dir.clone(),
        workers: args.workers,
        offline,
        today,
    })
}

fn run_cmd(args: RangeArgs, offline: bool) -> Result<bool> {
    let config = load_config(args.config.as_deref())?;
    let options = run_options(&args, offline)?;

    let sources = if offline {
        PipelineSources::offline()
    } else {
        let credentials = Credentials::new(args.dart_api_key, args.openai_api_key)?;
        PipelineSources::remote(&credentials, &config)?
    };

    let summary = run_pipeline(&config, sources, &options)?;
    print_summary(&summary);
    Ok(summary.is_success())
}

fn collect_cmd(args: RangeArgs) -> Result<bool> {
    let config = load_config(args.config.as_deref())?;
    let options = run_options(&args, false)?;
    let credentials = Credentials::new(args.dart_api_key.clone(), args.openai_api_key.clone())?;
    let client = DartClient::new(
        credentials.dart_api_key.clone(),
        Arc::new(CircuitBreaker::for_source("opendart")),
    )?
    .with_page_size(config.collector.page_size);

    let cancel = Arc::new(AtomicBool::new(false));
    let reports = run_collection(&config, Arc::new(client), &options, cancel)?;

    let mut success = true;
    for report in &reports {
        print_collection(report);
        success &= report.committed_count() > 0 || report.is_up_to_date();
    }
    let stored = disclosure_store(&options.data_dir).read_unique()?;
    println!("Store: {} disclosures", stored.len());
    Ok(success)
}

fn checkpoint_status(data_dir: &Path, json: bool) -> Result<()> {
    let store = checkpoint_store(data_dir);
    if !store.path().exists() {
        println!("No checkpoint in {}", data_dir.display());
        return Ok(());
    }

    let checkpoint = match store.load() {
        Ok(c) => c,
        Err(CheckpointError::Corrupt { path, reason }) => {
            println!("Checkpoint is corrupt: {} ({reason})", path.display());
            println!("The next collection will quarantine it and rebuild from the store.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
        return Ok(());
    }

    println!("Checkpoint: {}", data_dir.join(CHECKPOINT_FILE).display());
    if let Some(at) = checkpoint.updated_at {
        println!("Updated:    {at}");
    }
    if checkpoint.filing_types.is_empty() {
        println!("No filing types synced yet.");
        return Ok(());
    }
    println!();
    println!("{:<8} {:<14} {:>7} {:>10} {:>8}", "Type", "Synced", "Spans", "Known IDs", "Digest");
    println!("{}", "-".repeat(51));
    for (filing_type, progress) in &checkpoint.filing_types {
        let synced = progress
            .synced_through()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into());
        let digest = if progress.is_consistent() { "ok" } else { "MISMATCH" };
        println!(
            "{:<8} {:<14} {:>7} {:>10} {:>8}",
            filing_type.as_str(),
            synced,
            progress.synced.len(),
            progress.known_ids.len(),
            digest
        );
        for span in &progress.synced {
            println!("         {span}");
        }
    }
    Ok(())
}

fn print_collection(report: &CollectionReport) {
    println!();
    println!("=== Collection {} ===", report.filing_type);
    println!("Requested:      {}", report.requested);
    if report.pending.is_empty() {
        println!("Fetched:        nothing (already synced)");
    }
    for gap in &report.pending {
        println!("Fetched:        {gap}");
    }
    if report.recovered_checkpoint {
        println!("WARNING: corrupt checkpoint was quarantined and rebuilt");
    }
    println!("Sub-ranges:     {} committed", report.committed_count());
    println!("Accepted:       {}", report.accepted_count());
    println!("Rejected:       {}", report.rejections.len());
    if let Some(date) = report.synced_through {
        println!("Synced through: {date}");
    }
    for outcome in report.failed_ranges() {
        match &outcome.status {
            SubRangeStatus::Failed { error } => println!("FAILED {}: {error}", outcome.range),
            _ => println!("CANCELLED {}", outcome.range),
        }
    }
}

fn print_summary(summary: &PipelineSummary) {
    println!();
    println!("=== Pipeline Result ===");
    if summary.up_to_date && summary.committed_sub_ranges == 0 {
        println!("Collection:     up to date");
    } else {
        println!("Collection:     {} sub-range(s) committed", summary.committed_sub_ranges);
    }
    println!("Ingested:       {}", summary.ingested);
    println!("Rejected:       {}", summary.rejected);
    println!("Disclosures:    {} ({} events)", summary.disclosures, summary.events);
    println!();
    println!("--- Window ---");
    if let Some(stats) = &summary.selected_stats {
        println!("Half window:    {} trading days", stats.half_window);
        println!("Retention:      {:.1}%", stats.retention_rate * 100.0);
        println!("Proxy score:    {:.4}", stats.proxy_score);
    }
    if summary.window_warning {
        println!("WARNING: no candidate met the retention floor");
    }
    println!();
    println!("--- Features ---");
    println!("Rows:           {}", summary.feature_rows);
    println!("Excluded:       {}", summary.excluded);
    for failed in &summary.failed_ranges {
        println!("FAILED {} {}: {}", failed.filing_type, failed.range, failed.error);
    }
    if let Some(paths) = &summary.artifacts {
        println!();
        println!("Features saved to: {}", paths.features_csv.display());
    }
    println!();
}
