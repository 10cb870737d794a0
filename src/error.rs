//! Error types for the posting bot.
//!
//! Each operation gets its own error kind so callers can distinguish
//! "log and continue" from "abort the run":
//! - [`ConfigError`] and [`CatalogError`] are fatal; they propagate out of
//!   `main` and produce a non-zero exit.
//! - [`SendError`], [`ComposeError`], and a rejected duplicate record are
//!   per-attempt failures; they are converted to statistics and log entries
//!   at the dispatch boundary and never abort the run.
//! - Ledger *corruption* on load is recovered (warn + empty ledger);
//!   [`LedgerError`] covers lock and persist I/O failures, which also abort
//!   with a non-zero exit: once a send has gone out, continuing without a
//!   durable record risks duplicate posts, so the run stops for operator
//!   attention instead.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems, detected before any send attempt.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no message templates configured")]
    NoTemplates,

    #[error("missing or placeholder credential `{0}` (required unless --dry-run)")]
    MissingCredential(&'static str),

    #[error("posting window start hour {start} is after end hour {end}")]
    InvalidWindow { start: u32, end: u32 },

    #[error("timezone offset {0} is out of range (-23..=23 hours)")]
    InvalidTzOffset(i32),

    #[error("min posting probability {min} exceeds max {max}")]
    InvalidProbabilityBounds { min: f64, max: f64 },
}

/// The catalog is the only source of postable items; if it cannot be read
/// there is nothing to do, so these are fatal for the run.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog file not found: {0}")]
    Missing(PathBuf),

    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Failures while persisting or locking the posting ledger.
///
/// A malformed ledger *file* is not represented here; loading recovers from
/// corruption by starting empty (with a logged warning about re-post risk).
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write ledger {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to lock ledger {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A single outbound post failed. Terminal for the attempt, never retried
/// within the same invocation.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("feed response did not contain a post id")]
    MalformedResponse,
}

/// An item could not be rendered into a message. The item is skipped; it is
/// never posted with a missing field.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("item {0} has an empty blurb")]
    MissingBlurb(String),

    #[error("item {0} has no short URL")]
    MissingShortUrl(String),
}

/// Failures of the catalog enrichment pass (CSV in, CSV out). Per-title
/// lookup failures are not errors; they leave the link columns empty.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("input catalog not found: {0}")]
    Missing(PathBuf),

    #[error("failed to read input catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write output catalog {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("affiliate tag is not configured")]
    MissingAffiliateTag,

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Top-level error for one bot run. Only these propagate to process exit.
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
