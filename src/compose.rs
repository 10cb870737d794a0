//! Selecting an item to post and rendering it into a message.

use chrono::NaiveDate;
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::warn;

use crate::error::ComposeError;
use crate::ledger::PostingLedger;
use crate::models::PostableItem;

/// The feed rejects messages longer than this; composition warns but leaves
/// enforcement to the feed so nothing is silently truncated.
const FEED_MAX_CHARS: usize = 280;

/// Items that have not been posted today.
pub fn select_eligible<'a>(
    items: &'a [PostableItem],
    ledger: &PostingLedger,
    today: NaiveDate,
) -> Vec<&'a PostableItem> {
    items
        .iter()
        .filter(|item| !ledger.posted_today(&item.id, today))
        .collect()
}

/// Render an item through one of the configured templates, chosen uniformly
/// at random. `{blurb}` and `{short_url}` are substituted; an item missing
/// either field is a hard error and must be skipped, never posted empty.
pub fn compose<R: Rng>(
    item: &PostableItem,
    templates: &[String],
    rng: &mut R,
) -> Result<String, ComposeError> {
    if item.blurb.trim().is_empty() {
        return Err(ComposeError::MissingBlurb(item.id.clone()));
    }
    let short_url = item
        .short_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ComposeError::MissingShortUrl(item.id.clone()))?;

    let template = templates
        .choose(rng)
        .map(String::as_str)
        .unwrap_or("{blurb}\n\n{short_url}");

    let message = template
        .replace("{blurb}", &item.blurb)
        .replace("{short_url}", short_url);

    if message.chars().count() > FEED_MAX_CHARS {
        warn!(
            id = %item.id,
            chars = message.chars().count(),
            "Composed message exceeds the feed limit; the feed may reject it"
        );
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::TempDir;

    fn item(id: &str, blurb: &str, short_url: Option<&str>) -> PostableItem {
        PostableItem {
            id: id.to_string(),
            title: format!("Book {id}"),
            blurb: blurb.to_string(),
            short_url: short_url.map(str::to_string),
        }
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_select_excludes_items_posted_today() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let today = day("2025-06-01");

        let mut ledger = PostingLedger::load(&path);
        ledger.record("2", today).unwrap();
        ledger.record("3", day("2025-05-31")).unwrap();

        let items = vec![
            item("1", "a", Some("http://x/1")),
            item("2", "b", Some("http://x/2")),
            item("3", "c", Some("http://x/3")),
        ];
        let eligible = select_eligible(&items, &ledger, today);
        let ids: Vec<&str> = eligible.iter().map(|i| i.id.as_str()).collect();
        // 2 was posted today; 3's entry is from yesterday and does not block
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_compose_contains_both_fields_once() {
        let templates = vec![
            "{blurb}\n\n{short_url}\n\n#KindleUnlimited".to_string(),
            "📚 {blurb}\n\n{short_url}\n\n#KindleUnlimited".to_string(),
        ];
        let it = item("1", "Hello", Some("http://x/1"));
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..20 {
            let message = compose(&it, &templates, &mut rng).unwrap();
            assert_eq!(message.matches("Hello").count(), 1);
            assert_eq!(message.matches("http://x/1").count(), 1);
        }
    }

    #[test]
    fn test_compose_missing_blurb_is_error() {
        let it = item("4", "   ", Some("http://x/4"));
        let templates = vec!["{blurb} {short_url}".to_string()];
        let err = compose(&it, &templates, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, ComposeError::MissingBlurb(id) if id == "4"));
    }

    #[test]
    fn test_compose_missing_short_url_is_error() {
        let it = item("5", "Good book", None);
        let templates = vec!["{blurb} {short_url}".to_string()];
        let err = compose(&it, &templates, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, ComposeError::MissingShortUrl(id) if id == "5"));
    }

    #[test]
    fn test_compose_picks_from_configured_templates() {
        let templates = vec![
            "A: {blurb} {short_url}".to_string(),
            "B: {blurb} {short_url}".to_string(),
        ];
        let it = item("6", "x", Some("u"));
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen_a = false;
        let mut seen_b = false;
        for _ in 0..100 {
            let message = compose(&it, &templates, &mut rng).unwrap();
            seen_a |= message.starts_with("A:");
            seen_b |= message.starts_with("B:");
        }
        assert!(seen_a && seen_b);
    }
}
