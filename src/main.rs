//! # Kindle Post Bot
//!
//! Enriches a Kindle Unlimited book catalog with Amazon affiliate links and
//! paces posts of those links to X across the day.
//!
//! ## Features
//!
//! - Resolves titles to Amazon product pages and appends an affiliate tag,
//!   shortening the result via Bitly or TinyURL (`enrich`)
//! - Makes one scheduler-friendly posting decision per invocation (`post`):
//!   timezone-aware posting window, adaptive probability pacing against the
//!   daily quota, and an atomically updated de-duplication ledger
//! - Long-running mode with randomized inter-post waits (`run`)
//! - Dry-run mode that displays composed posts without sending
//!
//! ## Usage
//!
//! ```sh
//! kindle_post_bot enrich -i titles.csv -o catalog_with_links.csv
//! kindle_post_bot --dry-run post
//! ```

use std::error::Error;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod bot;
mod catalog;
mod cli;
mod compose;
mod config;
mod enrich;
mod error;
mod feed;
mod ledger;
mod links;
mod models;
mod pacing;

use bot::Dispatcher;
use cli::{Cli, Command};
use config::BotConfig;
use feed::XApiClient;
use ledger::PostingLedger;
use models::RunStats;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    let mut config = BotConfig::load(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    match args.command {
        Command::Post => {
            config.validate_for_send()?;
            let mut stats = RunStats::default();
            let mut rng = rand::rng();
            let outcome = if config.dry_run {
                let dispatcher: Dispatcher<XApiClient> = Dispatcher::DryRun;
                bot::run_once(
                    &config,
                    &dispatcher,
                    &mut rng,
                    &mut stats,
                    chrono::Utc::now(),
                )
                .await?
            } else {
                let feed = XApiClient::new(&config.credentials, feed::SEND_TIMEOUT)?;
                let dispatcher = Dispatcher::Live(feed);
                bot::run_once(
                    &config,
                    &dispatcher,
                    &mut rng,
                    &mut stats,
                    chrono::Utc::now(),
                )
                .await?
            };
            // per-attempt failures surface in the statistics, not the exit
            // status; only config/catalog errors exit non-zero
            info!(?outcome, "Run complete");
            stats.report();
        }
        Command::Run => {
            config.validate_for_send()?;
            let mut stats = RunStats::default();
            let mut rng = rand::rng();
            if config.dry_run {
                let dispatcher: Dispatcher<XApiClient> = Dispatcher::DryRun;
                bot::run_loop(&config, &dispatcher, &mut rng, &mut stats).await?;
            } else {
                let feed = XApiClient::new(&config.credentials, feed::SEND_TIMEOUT)?;
                let dispatcher = Dispatcher::Live(feed);
                bot::run_loop(&config, &dispatcher, &mut rng, &mut stats).await?;
            }
            stats.report();
        }
        Command::Enrich { input, output } => {
            let report = enrich::process_catalog(&input, &output, &config.enrich).await?;
            info!(
                total = report.total,
                resolved = report.resolved,
                output = %output.display(),
                "Enrichment finished"
            );
            println!(
                "resolved {}/{} titles -> {}",
                report.resolved,
                report.total,
                output.display()
            );
        }
        Command::ResetHistory { yes } => {
            if !yes {
                warn!("Refusing to reset the posting ledger without --yes");
                return Err("pass --yes to confirm resetting the posting ledger".into());
            }
            let mut ledger = PostingLedger::load(&config.ledger_path);
            let removed = ledger.reset()?;
            println!("cleared {removed} ledger entries");
        }
    }

    Ok(())
}

/// Flags and environment variables override the config file.
fn apply_overrides(config: &mut BotConfig, args: &Cli) {
    if args.dry_run {
        config.dry_run = true;
    }
    let c = &mut config.credentials;
    if args.api_key.is_some() {
        c.api_key = args.api_key.clone();
    }
    if args.api_secret.is_some() {
        c.api_secret = args.api_secret.clone();
    }
    if args.access_token.is_some() {
        c.access_token = args.access_token.clone();
    }
    if args.access_token_secret.is_some() {
        c.access_token_secret = args.access_token_secret.clone();
    }
    if args.bearer_token.is_some() {
        c.bearer_token = args.bearer_token.clone();
    }
}
