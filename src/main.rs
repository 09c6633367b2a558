//! Metacrawl main entry point
//!
//! This is the command-line interface for the metacrawl page metadata crawler.

use anyhow::{Context, Result};
use clap::Parser;
use metacrawl::config::{parse_config, resolve_config, Config, ConfigOverrides};
use metacrawl::crawler::run_crawl;
use metacrawl::output::{load_statistics, print_statistics, print_summary};
use metacrawl::storage::open_existing_storage;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Metacrawl: a resumable, budgeted metadata crawler
///
/// Metacrawl crawls the pages of one host starting from the given seeds,
/// records titles, emphasized text and links of every page, and stops once
/// the document budget is reached or no pages are left. Interrupted crawls
/// resume where they stopped.
#[derive(Parser, Debug)]
#[command(name = "metacrawl")]
#[command(version)]
#[command(about = "A resumable, budgeted metadata crawler", long_about = None)]
struct Cli {
    /// Seed URLs (replace the seeds of the configuration file)
    #[arg(value_name = "SEED")]
    seeds: Vec<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of page records to store
    #[arg(short, long, value_name = "N")]
    budget: Option<u64>,

    /// Host that discovered links must match (defaults to the first seed's host)
    #[arg(short, long, value_name = "HOST")]
    domain: Option<String>,

    /// Number of concurrent workers
    #[arg(short, long, value_name = "N")]
    workers: Option<u32>,

    /// Path to the SQLite database
    #[arg(long, value_name = "PATH")]
    database: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start a fresh crawl, ignoring previous state
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    if cli.stats {
        return handle_stats(&cli);
    }

    if let Some(path) = &cli.config {
        tracing::info!("Loading configuration from: {}", path.display());
    }
    let (config, config_hash) = resolve_config(cli.config.as_deref(), overrides(&cli))
        .context("Failed to load configuration")?;
    tracing::debug!("Configuration hash: {}", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(&config, cli.fresh, &config_hash).await
}

/// Collects the values given on the command line
fn overrides(cli: &Cli) -> ConfigOverrides {
    ConfigOverrides {
        seeds: cli.seeds.clone(),
        document_budget: cli.budget,
        domain: cli.domain.clone(),
        workers: cli.workers,
        database_path: cli.database.clone(),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("metacrawl=info,warn"),
            1 => EnvFilter::new("metacrawl=debug,info"),
            2 => EnvFilter::new("metacrawl=trace,debug"),
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

/// Handles the --dry-run mode: shows the resolved configuration
fn handle_dry_run(config: &Config) {
    println!("=== Metacrawl Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Document budget: {}", config.crawler.document_budget);
    println!("  Workers: {}", config.crawler.workers);
    println!(
        "  Attempts per URL: {} ({}ms apart, {}ms each)",
        config.crawler.max_attempts,
        config.crawler.retry_backoff_ms,
        config.crawler.attempt_timeout_ms
    );
    println!(
        "  Stale claim threshold: {}s",
        config.crawler.stale_threshold_secs
    );
    println!(
        "  Failed URL requeues: {}",
        config.crawler.max_failed_requeues
    );
    println!(
        "  Persist over budget: {}",
        config.crawler.persist_over_budget
    );

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    if let Some(dir) = &config.output.raw_content_dir {
        println!("  Raw content: {}", dir);
    }

    println!("\nScope:");
    match &config.scope.domain {
        Some(domain) => println!("  Domain: {}", domain),
        None => println!("  Domain: host of the first seed"),
    }
    println!("  Seeds ({}):", config.scope.seeds.len());
    for seed in &config.scope.seeds {
        println!("    * {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(cli: &Cli) -> Result<()> {
    let database_path = match (&cli.database, &cli.config) {
        (Some(path), _) => path.clone(),
        (None, Some(config_path)) => {
            parse_config(config_path)
                .context("Failed to load configuration")?
                .output
                .database_path
        }
        (None, None) => Config::default().output.database_path,
    };

    println!("Database: {}\n", database_path);

    let storage = open_existing_storage(Path::new(&database_path))
        .with_context(|| format!("Failed to open database {}", database_path))?;
    let stats = load_statistics(&storage).context("Failed to load statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, fresh: bool, config_hash: &str) -> Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    } else {
        tracing::info!("Starting crawl (will resume if an unfinished session exists)");
    }
    tracing::info!("Seed URLs: {}", config.scope.seeds.len());

    let summary = run_crawl(config, fresh, config_hash)
        .await
        .context("Crawl failed")?;
    print_summary(&summary);

    Ok(())
}
