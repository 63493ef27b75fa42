//! Toon-Leech main entry point
//!
//! This is the command-line interface for the Toon-Leech chapter harvester.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toon_leech::config::{load_config_with_hash, validate_rename, Config};
use toon_leech::output::{load_statistics, print_statistics};
use toon_leech::storage::{open_store, ProgressStore, RunStatus};
use toon_leech::transport::HttpTransport;
use toon_leech::{HarvestEngine, LeechError};
use tracing_subscriber::EnvFilter;

/// Toon-Leech: a resumable chapter harvester
///
/// Toon-Leech follows chained publications from one chapter to the next,
/// archives every chapter as a CBZ file exactly once, and remembers where
/// each series stopped so the next run picks up from there.
#[derive(Parser, Debug)]
#[command(name = "toon-leech")]
#[command(version = "1.0.0")]
#[command(about = "A resumable chapter harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Harvest a single series, even if it is marked finished
    #[arg(long, value_name = "NAME", conflicts_with_all = ["list", "reset", "rename", "dry_run"])]
    series: Option<String>,

    /// Show library statistics from the database and exit
    #[arg(long, conflicts_with_all = ["reset", "rename", "dry_run"])]
    list: bool,

    /// Clear the finished flag of a series and exit
    #[arg(long, value_name = "NAME", conflicts_with_all = ["rename", "dry_run"])]
    reset: Option<String>,

    /// Rename a series (archive directory and records) and exit; rename its `[[series]]` entry first
    #[arg(long, num_args = 2, value_names = ["OLD", "NEW"], conflicts_with = "dry_run")]
    rename: Option<Vec<String>>,

    /// Validate config and show what would be harvested without fetching anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(ExitCode::SUCCESS);
    }

    let database = Path::new(&config.storage.database_path);
    let store = Arc::new(
        open_store(database)
            .with_context(|| format!("Failed to open database {}", database.display()))?,
    );

    if cli.list {
        let stats = load_statistics(store.as_ref(), &config.storage.library_root())?;
        print_statistics(&stats);
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancellationToken::new();
    let transport = Arc::new(HttpTransport::new(&config.http).context("Failed to build HTTP client")?);
    let engine = HarvestEngine::from_config(&config, store.clone(), transport, cancel.clone())?;

    // before subscribe, which would register the new name as a fresh series
    if let Some(names) = &cli.rename {
        let [old, new] = names.as_slice() else {
            bail!("--rename takes exactly two names");
        };
        validate_rename(&config, old, new)?;
        engine.rename_series(old, new)?;
        println!("✓ Renamed {} to {}", old, new);
        return Ok(ExitCode::SUCCESS);
    }

    engine.subscribe(&config.series)?;

    if let Some(name) = &cli.reset {
        engine.reset_series(name)?;
        println!("✓ {} will be harvested again", name);
        return Ok(ExitCode::SUCCESS);
    }

    spawn_ctrl_c_handler(cancel);

    let run_id = store.create_run(&config_hash)?;
    let outcome = match &cli.series {
        Some(name) => handle_single(&engine, name).await,
        None => handle_batch(&engine).await,
    };

    let status = match &outcome {
        Ok(true) => RunStatus::Completed,
        Ok(false) => RunStatus::Failed,
        Err(LeechError::Cancelled) => RunStatus::Interrupted,
        Err(_) => RunStatus::Failed,
    };
    store.finish_run(run_id, status)?;

    match outcome {
        Ok(true) => Ok(ExitCode::SUCCESS),
        Ok(false) => Ok(ExitCode::FAILURE),
        Err(LeechError::Cancelled) => {
            tracing::warn!("Harvest interrupted");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("toon_leech=info,warn"),
            1 => EnvFilter::new("toon_leech=debug,info"),
            2 => EnvFilter::new("toon_leech=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Cancels the harvest on Ctrl-C; in-flight chapters are discarded
fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, stopping after discarding in-flight chapters");
            cancel.cancel();
        }
    });
}

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config) {
    println!("=== Toon-Leech Dry Run ===\n");

    println!("Harvest:");
    println!("  Page concurrency: {}", config.harvest.page_concurrency);
    println!("  Series concurrency: {}", config.harvest.series_concurrency);
    println!(
        "  Retry: {} attempts, {}ms..{}ms back-off",
        config.retry.max_attempts, config.retry.initial_backoff_ms, config.retry.max_backoff_ms
    );

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Library: {}", config.storage.library_root);

    println!("\nSources ({}):", config.sources.len());
    for source in &config.sources {
        println!("  - {} (pages: {})", source.domain, source.page_selector);
    }

    println!("\nSeries ({}):", config.series.len());
    for series in &config.series {
        println!(
            "  - {} [{}] from {} at {}",
            series.name, series.lang, series.start_episode, series.start_url
        );
    }

    println!("\n✓ Configuration is valid");
}

/// Handles --series: the error of the walk is surfaced directly
async fn handle_single(engine: &HarvestEngine, name: &str) -> Result<bool, LeechError> {
    let report = engine.leech_one(name).await?;
    println!("{}", report.summary_line());
    Ok(true)
}

/// Handles the default mode: every unfinished series
///
/// Returns false when any series failed.
async fn handle_batch(engine: &HarvestEngine) -> Result<bool, LeechError> {
    let batch = engine.leech_all().await?;
    batch.print();
    Ok(!batch.has_hard_failures())
}
