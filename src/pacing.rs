//! Eligibility windowing and the probability-based pacing decision.
//!
//! The bot is invoked on a fixed schedule (e.g. hourly), but posting every
//! time would either burst the whole quota early in the window or blow past
//! it. Instead each invocation samples a posting probability that adapts to
//! the remaining quota and the remaining window:
//!
//! - quota exhausted: probability 0, a hard stop
//! - more posts remaining than hours remaining: `max_p`, must catch up
//! - otherwise `clamp(remaining_posts / remaining_hours * 0.8, min_p, max_p)`
//!
//! The 0.8 damping biases toward spreading posts out rather than bursting.
//!
//! The host clock is assumed to be UTC; the audience's local clock is that
//! plus a fixed offset. Every hour and date in this module is audience-local.

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};
use rand::Rng;
use tracing::{debug, info};

/// Damping applied to the proportional posting rate.
const SPREAD_FACTOR: f64 = 0.8;

/// Convert a UTC instant to the audience's calendar date and hour.
pub fn local_parts(now_utc: DateTime<Utc>, offset: FixedOffset) -> (NaiveDate, u32) {
    let local = now_utc.with_timezone(&offset);
    (local.date_naive(), local.hour())
}

/// Whether `local_hour` falls inside the posting window. Inclusive on both
/// ends: a window of (9, 22) permits posting from 09:00 through 22:59.
pub fn is_within_window(local_hour: u32, window_start_hour: u32, window_end_hour: u32) -> bool {
    window_start_hour <= local_hour && local_hour <= window_end_hour
}

/// Probability of posting during this invocation.
pub fn posting_probability(
    today_count: u32,
    quota: u32,
    local_hour: u32,
    window_end_hour: u32,
    min_p: f64,
    max_p: f64,
) -> f64 {
    if today_count >= quota {
        return 0.0;
    }
    let remaining_posts = i64::from(quota) - i64::from(today_count);
    // inclusive of the current hour
    let remaining_hours = (i64::from(window_end_hour) - i64::from(local_hour) + 1).max(1);

    if remaining_posts >= remaining_hours {
        return max_p;
    }
    let base = remaining_posts as f64 / remaining_hours as f64;
    (base * SPREAD_FACTOR).clamp(min_p, max_p)
}

/// Decide whether to post now.
///
/// Returns false immediately outside the window or at quota. Otherwise
/// draws exactly one uniform sample in `[0, 1)` and compares it against the
/// probability. One draw per decision keeps the distribution unbiased;
/// retry-until-true would not.
#[allow(clippy::too_many_arguments)]
pub fn should_post_now<R: Rng>(
    rng: &mut R,
    today_count: u32,
    quota: u32,
    local_hour: u32,
    window_start_hour: u32,
    window_end_hour: u32,
    min_p: f64,
    max_p: f64,
) -> bool {
    if !is_within_window(local_hour, window_start_hour, window_end_hour) {
        debug!(
            local_hour,
            window_start_hour, window_end_hour, "Outside posting window"
        );
        return false;
    }
    if today_count >= quota {
        debug!(today_count, quota, "Daily quota reached");
        return false;
    }

    let probability = posting_probability(
        today_count,
        quota,
        local_hour,
        window_end_hour,
        min_p,
        max_p,
    );
    let sample: f64 = rng.random();
    let decision = sample < probability;
    info!(
        local_hour,
        today_count,
        quota,
        probability = format!("{probability:.2}"),
        decision = if decision { "post" } else { "skip" },
        "Pacing decision"
    );
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    /// Rng that yields a fixed bit pattern, for exercising decision
    /// boundaries with the extreme samples.
    struct ConstRng(u64);

    impl RngCore for ConstRng {
        fn next_u32(&mut self) -> u32 {
            self.0 as u32
        }
        fn next_u64(&mut self) -> u64 {
            self.0
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for b in dest.iter_mut() {
                *b = self.0 as u8;
            }
        }
    }

    fn min_sample_rng() -> ConstRng {
        ConstRng(0) // draws 0.0, the most permissive sample
    }

    fn max_sample_rng() -> ConstRng {
        ConstRng(u64::MAX) // draws just below 1.0
    }

    #[test]
    fn test_window_boundaries_inclusive() {
        assert!(is_within_window(9, 9, 22));
        assert!(is_within_window(22, 9, 22));
        assert!(!is_within_window(8, 9, 22));
        assert!(!is_within_window(23, 9, 22));
    }

    #[test]
    fn test_quota_hard_stop_for_every_sample() {
        // today_count >= quota must refuse regardless of the draw
        for count in [9, 10, 100] {
            assert!(!should_post_now(
                &mut min_sample_rng(),
                count,
                9,
                12,
                9,
                22,
                0.5,
                0.9
            ));
            assert!(!should_post_now(
                &mut max_sample_rng(),
                count,
                9,
                12,
                9,
                22,
                0.5,
                0.9
            ));
        }
        assert_eq!(posting_probability(9, 9, 12, 22, 0.5, 0.9), 0.0);
    }

    #[test]
    fn test_outside_window_never_posts() {
        for hour in [0, 8, 23] {
            assert!(!should_post_now(
                &mut min_sample_rng(),
                0,
                9,
                hour,
                9,
                22,
                0.5,
                0.9
            ));
        }
    }

    #[test]
    fn test_catch_up_uses_max_probability() {
        // 5 posts left, 3 hours left: post aggressively
        let p = posting_probability(4, 9, 20, 22, 0.5, 0.9);
        assert_eq!(p, 0.9);
    }

    #[test]
    fn test_start_of_day_scenario() {
        // ledger empty, quota 9, window (9, 22), local hour 9:
        // remaining_posts = 9, remaining_hours = 14, 9 < 14 so the damped
        // proportional path applies: 9/14 * 0.8 ≈ 0.514
        let p = posting_probability(0, 9, 9, 22, 0.5, 0.9);
        let expected = 9.0 / 14.0 * 0.8;
        assert!((p - expected).abs() < 1e-12);
        assert!(p >= 0.5 && p <= 0.9);
    }

    #[test]
    fn test_probability_clamped_to_min() {
        // 1 post left, 14 hours left: 1/14 * 0.8 ≈ 0.057, clamped up
        let p = posting_probability(8, 9, 9, 22, 0.5, 0.9);
        assert_eq!(p, 0.5);
    }

    #[test]
    fn test_probability_monotone_in_remaining_posts() {
        // holding quota and window fixed, more remaining posts never
        // decreases urgency
        let quota = 9;
        let mut last = f64::INFINITY;
        for today_count in 0..=quota {
            let p = posting_probability(today_count, quota, 15, 22, 0.1, 0.9);
            assert!(
                p <= last,
                "probability rose as remaining posts shrank: {p} > {last}"
            );
            last = p;
        }
    }

    #[test]
    fn test_decision_follows_probability() {
        // sample 0.0 always posts while quota remains; sample ~1.0 never does
        assert!(should_post_now(&mut min_sample_rng(), 0, 9, 12, 9, 22, 0.5, 0.9));
        assert!(!should_post_now(&mut max_sample_rng(), 0, 9, 12, 9, 22, 0.5, 0.9));
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let mut a = StdRng::seed_from_u64(17);
        let mut b = StdRng::seed_from_u64(17);
        for _ in 0..50 {
            assert_eq!(
                should_post_now(&mut a, 2, 9, 12, 9, 22, 0.5, 0.9),
                should_post_now(&mut b, 2, 9, 12, 9, 22, 0.5, 0.9)
            );
        }
    }

    #[test]
    fn test_local_parts_wraps_past_midnight() {
        // 16:00 UTC + 9h = 01:00 next day in JST
        let now = "2025-06-01T16:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let (date, hour) = local_parts(now, jst);
        assert_eq!(date, "2025-06-02".parse::<NaiveDate>().unwrap());
        assert_eq!(hour, 1);

        // negative offsets wrap the other way
        let est = FixedOffset::east_opt(-5 * 3600).unwrap();
        let early = "2025-06-01T03:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let (date, hour) = local_parts(early, est);
        assert_eq!(date, "2025-05-31".parse::<NaiveDate>().unwrap());
        assert_eq!(hour, 22);
    }
}
