//! One posting decision, end to end.
//!
//! Each invocation: load the ledger, prune it to today, load the catalog,
//! check the posting window, sample the pacing decision, pick an unposted
//! item, compose it, dispatch it (or display it in dry-run), and record the
//! post in the ledger. A send that fails is terminal for the attempt and is
//! never recorded. A ledger write that fails is fatal for the run, even
//! after a successful send: with no durable record the next invocation
//! could post the same item again, so the process exits non-zero instead
//! of carrying on.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::{error, info, instrument, warn};

use crate::catalog;
use crate::compose::{compose, select_eligible};
use crate::config::BotConfig;
use crate::error::BotError;
use crate::feed::FeedClient;
use crate::ledger::PostingLedger;
use crate::models::RunStats;
use crate::pacing;

/// How the dispatcher delivers a composed message.
#[derive(Debug)]
pub enum Dispatcher<F: FeedClient> {
    /// Print the message instead of sending it. Recording still happens, so
    /// repeated dry runs behave exactly like the live schedule.
    DryRun,
    Live(F),
}

/// What a single invocation did, for logging and exit reporting. None of
/// these are process errors; fatal conditions surface as [`BotError`].
#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Posted,
    SkippedOutsideWindow,
    SkippedQuota,
    SkippedPacing,
    NothingEligible,
    SendFailed,
    DuplicatePrevented,
}

/// Run one posting decision at `now_utc`.
#[instrument(level = "info", skip_all)]
pub async fn run_once<F: FeedClient, R: Rng>(
    config: &BotConfig,
    dispatcher: &Dispatcher<F>,
    rng: &mut R,
    stats: &mut RunStats,
    now_utc: DateTime<Utc>,
) -> Result<RunOutcome, BotError> {
    let offset = config.tz_offset();
    let (today, local_hour) = pacing::local_parts(now_utc, offset);
    info!(%today, local_hour, utc_hour = now_utc.format("%H").to_string(), "Evaluating posting decision");

    let mut ledger = PostingLedger::load(&config.ledger_path);
    ledger.prune_to_today(today)?;

    let items = catalog::load_items(&config.catalog_path)?;

    if !pacing::is_within_window(local_hour, config.window_start_hour, config.window_end_hour) {
        info!(
            local_hour,
            window_start = config.window_start_hour,
            window_end = config.window_end_hour,
            "Outside posting window; skipping"
        );
        return Ok(RunOutcome::SkippedOutsideWindow);
    }

    let today_count = ledger.count_today(today);
    if today_count >= config.posts_per_day {
        info!(
            today_count,
            quota = config.posts_per_day,
            "Daily quota reached; skipping"
        );
        return Ok(RunOutcome::SkippedQuota);
    }

    if !pacing::should_post_now(
        rng,
        today_count,
        config.posts_per_day,
        local_hour,
        config.window_start_hour,
        config.window_end_hour,
        config.min_posting_probability,
        config.max_posting_probability,
    ) {
        return Ok(RunOutcome::SkippedPacing);
    }

    let mut eligible = select_eligible(&items, &ledger, today);
    if eligible.is_empty() {
        info!("No unposted items remain today");
        return Ok(RunOutcome::NothingEligible);
    }

    // Pick an item that composes cleanly; items with missing fields are
    // skipped, not posted partially.
    let (item, message) = loop {
        let Some(candidate) = eligible.choose(rng).copied() else {
            info!("Every eligible item failed composition");
            return Ok(RunOutcome::NothingEligible);
        };
        match compose(candidate, &config.templates, rng) {
            Ok(message) => break (candidate, message),
            Err(e) => {
                warn!(id = %candidate.id, error = %e, "Skipping item that cannot be composed");
                eligible.retain(|i| i.id != candidate.id);
            }
        }
    };

    info!(id = %item.id, title = %item.title, "Dispatching post");
    match dispatcher {
        Dispatcher::DryRun => {
            println!("{:=^60}", " dry-run post preview ");
            println!("{message}");
            println!("{:=^60}", "");
            println!("item: no={} title={}", item.id, item.title);
            info!(id = %item.id, "Dry-run display complete");
        }
        Dispatcher::Live(feed) => match feed.publish(&message).await {
            Ok(post_id) => info!(id = %item.id, %post_id, "Live send succeeded"),
            Err(e) => {
                error!(id = %item.id, error = %e, "Live send failed; not recorded");
                stats.record_failure();
                return Ok(RunOutcome::SendFailed);
            }
        },
    }

    if ledger.record(&item.id, today)? {
        stats.record_success(now_utc.with_timezone(&offset));
        info!(id = %item.id, "Post recorded");
        Ok(RunOutcome::Posted)
    } else {
        // A concurrent invocation got there first. The duplicate was
        // prevented, which makes this attempt a failure, not a success.
        warn!(id = %item.id, "Duplicate record rejected by ledger");
        stats.record_failure();
        Ok(RunOutcome::DuplicatePrevented)
    }
}

/// Long-running variant: repeat the single-shot decision with a randomized
/// pause between attempts, until interrupted.
pub async fn run_loop<F: FeedClient, R: Rng>(
    config: &BotConfig,
    dispatcher: &Dispatcher<F>,
    rng: &mut R,
    stats: &mut RunStats,
) -> Result<(), BotError> {
    let (min_minutes, max_minutes) = config.interval_minutes;
    info!(min_minutes, max_minutes, "Starting long-running posting loop");

    loop {
        let outcome = run_once(config, dispatcher, rng, stats, Utc::now()).await?;
        info!(?outcome, "Attempt finished");

        let wait_minutes = if max_minutes > min_minutes {
            rng.random_range(min_minutes..=max_minutes)
        } else {
            min_minutes
        };
        info!(wait_minutes, "Sleeping until next attempt");

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(wait_minutes * 60)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; shutting down cleanly");
                return Ok(());
            }
        }
    }
}
