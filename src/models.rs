//! Data models shared across the bot.
//!
//! - [`PostableItem`]: one enriched catalog entry, immutable for the run
//! - [`RunStats`]: per-invocation counters, reported at exit and never
//!   persisted

use chrono::{DateTime, FixedOffset};

/// A catalog entry that is a candidate for posting.
///
/// Items are loaded from the enriched CSV; an item without a usable short
/// URL never reaches the selector.
#[derive(Debug, Clone)]
pub struct PostableItem {
    /// Stable identifier assigned in the catalog (the `no` column).
    pub id: String,
    /// Book title. Used for logging only, never posted verbatim.
    pub title: String,
    /// One-line introduction substituted into `{blurb}`.
    pub blurb: String,
    /// Shortened affiliate link substituted into `{short_url}`.
    pub short_url: Option<String>,
}

impl PostableItem {
    /// Whether this item carries a short URL worth posting.
    pub fn has_short_url(&self) -> bool {
        self.short_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

/// Counters for one invocation.
#[derive(Debug, Default)]
pub struct RunStats {
    pub total_attempts: u32,
    pub successful_posts: u32,
    pub failed_posts: u32,
    pub last_post_time: Option<DateTime<FixedOffset>>,
}

impl RunStats {
    pub fn record_success(&mut self, at: DateTime<FixedOffset>) {
        self.total_attempts += 1;
        self.successful_posts += 1;
        self.last_post_time = Some(at);
    }

    pub fn record_failure(&mut self) {
        self.total_attempts += 1;
        self.failed_posts += 1;
    }

    /// Print the end-of-run summary to stdout.
    pub fn report(&self) {
        let success_rate = if self.total_attempts == 0 {
            100.0
        } else {
            self.successful_posts as f64 / self.total_attempts as f64 * 100.0
        };
        println!("{:=^50}", " run statistics ");
        println!("attempts:   {}", self.total_attempts);
        println!("successful: {}", self.successful_posts);
        println!("failed:     {}", self.failed_posts);
        println!("success %:  {success_rate:.1}");
        match &self.last_post_time {
            Some(t) => println!("last post:  {}", t.format("%Y-%m-%d %H:%M:%S")),
            None => println!("last post:  none"),
        }
        println!("{:=^50}", "");
    }
}
