//! Legal Spider main entry point
//!
//! This is the command-line interface for the Legal Spider crawler.

use anyhow::{Context, Result};
use clap::Parser;
use legal_spider::config::{
    compute_config_hash, parse_config_file, validate, Config, ConfigOverrides,
};
use legal_spider::output::print_statistics;
use legal_spider::Coordinator;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Legal Spider: a compliance-constrained web crawler
///
/// Legal Spider crawls a single site from a seed URL while respecting
/// robots.txt, per-domain rate limits and safety exclusions for login,
/// admin and form-protected pages.
#[derive(Parser, Debug)]
#[command(name = "legal-spider")]
#[command(version = "1.0.0")]
#[command(about = "A compliance-constrained web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Seed URL to start crawling from
    #[arg(long, env = "SPIDER_START_URL")]
    seed: Option<String>,

    /// Maximum number of pages to fetch
    #[arg(long, env = "SPIDER_MAX_PAGES")]
    max_pages: Option<u32>,

    /// Maximum link depth from the seed
    #[arg(long, env = "SPIDER_MAX_DEPTH")]
    max_depth: Option<u32>,

    /// Requests per second per domain
    #[arg(long = "rps", env = "SPIDER_REQUESTS_PER_SECOND")]
    requests_per_second: Option<f64>,

    /// Number of concurrent workers
    #[arg(long, env = "SPIDER_CONCURRENCY")]
    concurrency: Option<u32>,

    /// Full User-Agent header to send
    #[arg(long, env = "SPIDER_USER_AGENT")]
    user_agent: Option<String>,

    /// Write the JSON report to this file
    #[arg(short, long, env = "SPIDER_OUTPUT_FILE")]
    output: Option<String>,

    /// Do not fetch or obey robots.txt
    #[arg(long)]
    ignore_robots: bool,

    /// Crawl pages matching authentication patterns
    #[arg(long)]
    allow_auth: bool,

    /// Expand pages containing login forms
    #[arg(long)]
    allow_forms: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            seed: self.seed.clone(),
            max_pages: self.max_pages,
            max_depth: self.max_depth,
            requests_per_second: self.requests_per_second,
            max_concurrent_requests: self.concurrency,
            user_agent: self.user_agent.clone(),
            results_path: self.output.clone(),
            ignore_robots: self.ignore_robots,
            allow_auth_pages: self.allow_auth,
            allow_forms: self.allow_forms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let (config, config_hash) = load(&cli)?;

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config, config_hash).await
}

/// Sets up the logging/tracing subscriber
///
/// `SPIDER_LOG_LEVEL` takes precedence over the verbosity flags.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = match std::env::var("SPIDER_LOG_LEVEL") {
        Ok(level) if !level.trim().is_empty() => EnvFilter::new(level),
        _ if quiet => EnvFilter::new("error"),
        _ => match verbose {
            0 => EnvFilter::new("legal_spider=info,warn"),
            1 => EnvFilter::new("legal_spider=debug,info"),
            2 => EnvFilter::new("legal_spider=trace,debug"),
            _ => EnvFilter::new("trace"),
        },
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Builds the effective configuration: file (or defaults), then overrides
fn load(cli: &Cli) -> Result<(Config, Option<String>)> {
    let (mut config, hash) = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let config = parse_config_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            let hash = compute_config_hash(path)?;
            tracing::info!("Configuration loaded (hash: {})", hash);
            (config, Some(hash))
        }
        None => (Config::default(), None),
    };

    config.apply_overrides(cli.overrides());
    validate(&config).context("invalid configuration")?;
    Ok((config, hash))
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Legal Spider Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Seed: {}", config.crawler.seed);
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Workers: {}", config.crawler.max_concurrent_requests);

    println!("\nPoliteness:");
    println!("  User agent: {}", config.user_agent.header_value());
    println!("  Respect robots.txt: {}", config.policy.respect_robots);
    println!(
        "  Rate limit: {} req/s (burst {})",
        config.rate_limit.requests_per_second, config.rate_limit.burst_capacity
    );
    println!("  Max retries: {}", config.http.max_retries);

    println!("\nSafety:");
    println!("  Avoid auth pages: {}", config.safety.avoid_auth_pages);
    println!("  Avoid forms: {}", config.safety.avoid_forms);
    println!("  Auth patterns: {}", config.safety.auth_patterns.len());
    println!("  Excluded paths: {}", config.safety.excluded_paths.len());

    println!("\nOutput:");
    match &config.output.results_path {
        Some(path) => println!("  Results: {}", path),
        None => println!("  Results: (not written)"),
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: Option<String>) -> Result<()> {
    let results_path = config.output.results_path.clone();

    let mut coordinator = Coordinator::new(config).context("failed to start crawler")?;
    if let Some(hash) = config_hash {
        coordinator = coordinator.with_config_hash(hash);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight requests");
            on_signal.cancel();
        }
    });

    let report = coordinator.run(cancel).await?;
    print_statistics(&report);

    if let Some(path) = results_path {
        report
            .write_json(Path::new(&path))
            .with_context(|| format!("failed to write results to {}", path))?;
        println!("\n✓ Results written to: {}", path);
    }

    Ok(())
}
