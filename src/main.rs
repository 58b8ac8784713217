use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use cfb_scraper::config::{parse_letters, ScraperConfig};
use cfb_scraper::logging::init_logging;
use cfb_scraper::metrics::init_metrics;
use cfb_scraper::pipeline::{Orchestrator, RunMode, RunSummary};

#[derive(Parser)]
#[command(name = "cfb_scraper")]
#[command(about = "NCAA football player statistics scraper")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the player index, then scrape every selected player
    Run(RunArgs),
    /// Only build the player index
    Index(RunArgs),
    /// Scrape players listed in an existing consolidated index
    Players(RunArgs),
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// TOML file with scraper settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Letters to scrape (comma-separated), e.g. A,B
    #[arg(long)]
    letters: Option<String>,
    #[arg(long)]
    max_players: Option<usize>,
    #[arg(long)]
    max_per_letter: Option<usize>,
    /// Re-scrape players that are already stored
    #[arg(long, visible_alias = "no-resume")]
    force: bool,
    /// Ignore cached letter indexes
    #[arg(long)]
    refresh_index: bool,
    /// file, couchdb or memory
    #[arg(long)]
    storage: Option<String>,
    #[arg(long)]
    storage_dir: Option<PathBuf>,
    #[arg(long)]
    concurrency: Option<usize>,
    /// Total attempts per request
    #[arg(long)]
    retries: Option<u32>,
    #[arg(long)]
    backoff_ms: Option<u64>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Courtesy delay between requests
    #[arg(long)]
    delay_ms: Option<u64>,
}

impl RunArgs {
    /// Defaults, then the config file, then the environment, then these flags.
    fn build_config(&self) -> cfb_scraper::error::Result<ScraperConfig> {
        let mut config = ScraperConfig::load(self.config.as_deref())?;
        if let Some(letters) = &self.letters {
            config.letters = parse_letters(letters)?;
        }
        if let Some(n) = self.max_players {
            config.max_players = Some(n);
        }
        if let Some(n) = self.max_per_letter {
            config.max_players_per_letter = Some(n);
        }
        if self.force {
            config.force_refresh = true;
        }
        if self.refresh_index {
            config.refresh_index = true;
        }
        if let Some(mode) = &self.storage {
            config.storage_mode = mode.parse()?;
        }
        if let Some(dir) = &self.storage_dir {
            config.storage_dir = dir.clone();
        }
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
        if let Some(n) = self.retries {
            config.max_retries = n;
        }
        if let Some(ms) = self.backoff_ms {
            config.initial_backoff_ms = ms;
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout_secs = secs;
        }
        if let Some(ms) = self.delay_ms {
            config.request_delay_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Exit status for a run outcome.
///
/// A run that reached the end exits 0 even when some players failed; those
/// are in the summary. Anything that aborted it, an unreadable index or a
/// store that could not be opened, exits 1.
fn exit_status(outcome: &anyhow::Result<RunSummary>) -> u8 {
    match outcome {
        Ok(_) => 0,
        Err(_) => EXIT_FATAL,
    }
}

const EXIT_FATAL: u8 = 1;

async fn execute(config: ScraperConfig, mode: RunMode) -> anyhow::Result<RunSummary> {
    let orchestrator = Orchestrator::from_config(config)
        .await
        .context("failed to initialise scraper")?;
    let summary = orchestrator.run(mode).await?;
    Ok(summary)
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Scrape results ({}):", summary.mode);
    println!("   Index entries: {}", summary.index_entries);
    println!("   Targets: {}", summary.targets);
    println!("   Stored: {}", summary.stored);
    println!("   Skipped: {}", summary.skipped);
    println!("   Failed: {}", summary.failed);
    println!("   Stored without stats: {}", summary.warnings);
    println!("   Conflicts retried: {}", summary.conflicts_retried);
    println!("   Duration: {:.1}s", summary.duration_secs);
    for failure in summary.failures.iter().take(10) {
        println!("   ❌ {}", failure);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (mode, args) = match cli.command {
        Commands::Run(args) => (RunMode::Full, args),
        Commands::Index(args) => (RunMode::IndexOnly, args),
        Commands::Players(args) => (RunMode::PlayersOnly, args),
    };

    let config = match args.build_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let _log_guard = match init_logging(&config.logs_dir()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("File logging disabled: {e}");
            None
        }
    };
    init_metrics(config.metrics_addr);

    info!(%mode, storage = %config.storage_mode, "cfb_scraper starting");
    let outcome = execute(config, mode).await;
    match &outcome {
        Ok(summary) => print_summary(summary),
        Err(e) => {
            error!("Run aborted: {e:#}");
            eprintln!("Run aborted: {e:#}");
        }
    }
    ExitCode::from(exit_status(&outcome))
}
