//! Command-line interface definitions.
//!
//! Credentials can come from the environment (the scheduled-runner path) or
//! from the YAML config file; flags win over the file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line arguments for the posting bot.
///
/// # Examples
///
/// ```sh
/// # One posting decision (the scheduled entry point)
/// kindle_post_bot post
///
/// # Keep running, sleeping between attempts
/// kindle_post_bot run
///
/// # Preview without sending
/// kindle_post_bot --dry-run post
///
/// # Build the enriched catalog
/// kindle_post_bot enrich -i titles.csv -o catalog_with_links.csv
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Display composed posts instead of sending them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// X API consumer key
    #[arg(long, env = "X_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// X API consumer secret
    #[arg(long, env = "X_API_SECRET", hide_env_values = true, global = true)]
    pub api_secret: Option<String>,

    /// X API access token
    #[arg(long, env = "X_ACCESS_TOKEN", hide_env_values = true, global = true)]
    pub access_token: Option<String>,

    /// X API access token secret
    #[arg(
        long,
        env = "X_ACCESS_TOKEN_SECRET",
        hide_env_values = true,
        global = true
    )]
    pub access_token_secret: Option<String>,

    /// X API bearer token
    #[arg(long, env = "X_BEARER_TOKEN", hide_env_values = true, global = true)]
    pub bearer_token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Make one posting decision and exit (for scheduled runners)
    Post,

    /// Run continuously, sleeping a randomized interval between decisions
    Run,

    /// Resolve affiliate links for a raw title catalog
    Enrich {
        /// Input CSV with `no, title, blurb` columns
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV; gains `product_url, affiliate_url, short_url`
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Clear the posting ledger
    ResetHistory {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}
