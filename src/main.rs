//! cf-list-sync - Synchronize Cloudflare managed IP lists from external feeds
//!
//! This is the main entry point for the cf-list-sync command.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cf_list_sync::api::CloudflareClient;
use cf_list_sync::config::{Config, ConfigError};
use cf_list_sync::report;
use cf_list_sync::source::{FeedCache, SourceFetcher};
use cf_list_sync::sync::Reconciler;

/// cf-list-sync - Synchronize Cloudflare managed IP lists from external feeds
#[derive(Parser, Debug)]
#[command(name = "cf-list-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "CF_LIST_SYNC_CONFIG", default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    // Use eprintln! since tracing is not yet initialized
    eprintln!("Loading configuration from file: {}", args.config);
    let config = Config::from_file(&args.config)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // Initialize tracing/logging; RUST_LOG overrides the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        accounts = config.accounts.len(),
        "Starting cf-list-sync"
    );

    // The API token never lives in the config file
    let api_token = std::env::var("CLOUDFLARE_API_TOKEN").map_err(|_| {
        anyhow::anyhow!(ConfigError::MissingRequired(
            "CLOUDFLARE_API_TOKEN environment variable".to_string()
        ))
    })?;

    if config.accounts.is_empty() {
        warn!("No accounts configured, nothing to do");
        return Ok(ExitCode::SUCCESS);
    }

    let client = CloudflareClient::new(&api_token, &config.http)?;
    let cache = FeedCache::new(&config.cache.dir);
    let fetcher = SourceFetcher::new(
        &config.http,
        config.retry.clone(),
        cache,
        config.sync.max_list_size,
    )?;

    let reconciler = Reconciler::new(client, fetcher, config.sync.clone());
    let run = reconciler.run(&config.accounts).await;

    if config.reports.enabled {
        if let Err(e) = report::write_report(&run, &config.reports, config.anonymize).await {
            error!(error = %e, "Failed to write run report");
        }
    }

    let failures = run.failures();
    info!(
        targets = run.targets.len(),
        failures = failures,
        "Reconciliation pass complete"
    );

    // Cron and systemd pick the failure count up from the exit status
    if failures > 0 {
        error!(failures = failures, "One or more targets failed to sync");
        Ok(ExitCode::from(failures.min(u8::MAX as usize) as u8))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
