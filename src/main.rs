//! Trace main entry point
//!
//! This is the command-line interface for the Trace web-content harvester.
//! Documents are written as JSON lines to stdout (or `--output`); logs and the
//! final summary go to stderr.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use trace_scraper::config::{load_config_with_hash, validate, Config};
use trace_scraper::output::{print_summary, DocumentSink, JsonLinesSink};
use trace_scraper::{ScrapeMode, Scraper};
use tracing_subscriber::EnvFilter;

/// Trace: a concurrent web-content harvester
///
/// Trace fetches pages from seed URLs while respecting per-host rate limits,
/// extracts structured text sections, and streams one JSON document per page.
#[derive(Parser, Debug)]
#[command(name = "trace")]
#[command(version)]
#[command(about = "A concurrent web-content harvester", long_about = None)]
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

    /// Additional seed URL (repeatable)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Override the configured scrape mode
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Override the configured page limit
    #[arg(long, value_name = "N")]
    max_pages: Option<usize>,

    /// Write JSON lines to this file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Validate config and show what would be scraped without fetching anything
    #[arg(long)]
    dry_run: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    SinglePage,
    RecursiveCrawl,
    Sitemap,
}

impl From<ModeArg> for ScrapeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::SinglePage => ScrapeMode::SinglePage,
            ModeArg::RecursiveCrawl => ScrapeMode::RecursiveCrawl,
            ModeArg::Sitemap => ScrapeMode::Sitemap,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_overrides(&mut config, &cli);
    validate(&config).context("Invalid configuration after command-line overrides")?;

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_scrape(config, cli.output).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trace_scraper=info,warn"),
            1 => EnvFilter::new("trace_scraper=debug,info"),
            2 => EnvFilter::new("trace_scraper=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    config.seeds.extend(cli.seeds.iter().cloned());
    if let Some(mode) = cli.mode {
        config.scraper.mode = mode.into();
    }
    if let Some(max_pages) = cli.max_pages {
        config.scraper.max_pages = Some(max_pages);
    }
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    let scraper = &config.scraper;

    println!("=== Trace Dry Run ===\n");

    println!("Scraper Configuration:");
    println!("  Mode: {}", scraper.mode);
    println!("  Frontier order: {:?}", scraper.frontier_order);
    println!("  Concurrency limit: {}", scraper.concurrency_limit);
    println!(
        "  Rate limit: {} req/s per host (burst {})",
        scraper.rate_limit, scraper.rate_limit_burst
    );
    println!("  Timeout: {}ms", scraper.timeout_ms);
    println!("  Max depth: {}", scraper.max_depth);
    match scraper.max_pages {
        Some(max) => println!("  Max pages: {}", max),
        None => println!("  Max pages: unlimited"),
    }
    match scraper.deadline_secs {
        Some(secs) => println!("  Deadline: {}s", secs),
        None => println!("  Deadline: none"),
    }

    println!("\nRetry Policy:");
    println!("  Max attempts: {}", scraper.retry.max_attempts);
    println!(
        "  Backoff: {}ms base, {}ms max, {:.0}% jitter",
        scraper.retry.base_delay_ms,
        scraper.retry.max_delay_ms,
        scraper.retry.jitter * 100.0
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    if scraper.allowed_domains.is_empty() {
        println!("\nAllowed Domains: seed hosts only");
    } else {
        println!("\nAllowed Domains ({}):", scraper.allowed_domains.len());
        for domain in &scraper.allowed_domains {
            println!("  - {}", domain);
        }
    }

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  * {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main scrape: streams documents into a JSON Lines sink
async fn handle_scrape(config: Config, output: Option<PathBuf>) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        });
    }

    let scraper = Scraper::with_http(config.scraper, &config.user_agent)?;
    let run = scraper.run_with_cancellation(&config.seeds, cancel)?;

    let summary = match output {
        Some(path) => {
            let file = tokio::fs::File::create(&path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let sink = JsonLinesSink::new(tokio::io::BufWriter::new(file));
            let summary = run.drain_into(&sink).await?;
            sink.flush().await?;
            tracing::info!("Documents written to {}", path.display());
            summary
        }
        None => {
            let sink = JsonLinesSink::new(tokio::io::stdout());
            let summary = run.drain_into(&sink).await?;
            sink.flush().await?;
            summary
        }
    };

    print_summary(&summary);
    Ok(())
}
