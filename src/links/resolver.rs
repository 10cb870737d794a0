//! Amazon Kindle store product resolution.
//!
//! Searches the Kindle store for a title and extracts the first product
//! page link (`/dp/<ASIN>`). Search result markup shifts frequently, so the
//! extraction works on every anchor's href rather than a specific result
//! card class.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

const SEARCH_BASE: &str = "https://www.amazon.co.jp/s";

/// A product path is `/dp/` followed by a ten-character ASIN.
static PRODUCT_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/dp/([A-Z0-9]{10})").expect("valid regex"));

/// Search the Kindle store for `title` and return the first product URL.
///
/// Returns `Ok(None)` when the search succeeds but no product link is
/// found; network failures bubble up for the caller to log and skip.
#[instrument(level = "info", skip_all, fields(%title))]
pub async fn search_kindle_store(
    client: &reqwest::Client,
    title: &str,
) -> Result<Option<String>, reqwest::Error> {
    let search_url = format!(
        "{SEARCH_BASE}?k={}&i=digital-text&ref=sr_nr_i_0",
        urlencoding::encode(title)
    );
    let html = client.get(&search_url).send().await?.text().await?;

    let product_url = extract_product_url(&html);
    match &product_url {
        Some(url) => info!(%url, "Resolved product page"),
        None => warn!("No product link in search results"),
    }
    Ok(product_url)
}

/// Pull the first `/dp/ASIN` link out of a search results page.
fn extract_product_url(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let anchor_selector = Selector::parse("a[href]").expect("valid selector");
    let base = Url::parse("https://www.amazon.co.jp/").expect("valid base url");

    for element in document.select(&anchor_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if let Some(m) = PRODUCT_PATH_RE.find(href) {
            if let Ok(resolved) = base.join(m.as_str()) {
                debug!(href, "Matched product anchor");
                return Some(resolved.to_string());
            }
        }
    }
    None
}

/// Append the Amazon Associates tag to a product URL.
pub fn affiliate_link(product_url: &str, tag: &str) -> String {
    let separator = if product_url.contains('?') { '&' } else { '?' };
    format!("{product_url}{separator}tag={tag}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_first_product_link() {
        let html = r#"
            <html><body>
              <a href="/gp/help/customer">help</a>
              <a href="/dp/B0ABCDEF12/ref=sr_1_1?keywords=book">First Hit</a>
              <a href="/dp/B0ZYXWVU98">Second Hit</a>
            </body></html>
        "#;
        assert_eq!(
            extract_product_url(html),
            Some("https://www.amazon.co.jp/dp/B0ABCDEF12".to_string())
        );
    }

    #[test]
    fn test_ignores_non_product_links() {
        let html = r#"<a href="/gp/bestsellers">charts</a><a href="/stores/page/123">store</a>"#;
        assert_eq!(extract_product_url(html), None);
    }

    #[test]
    fn test_asin_must_be_ten_characters() {
        let html = r#"<a href="/dp/SHORT1">bad</a>"#;
        assert_eq!(extract_product_url(html), None);
    }

    #[test]
    fn test_affiliate_link_separator() {
        assert_eq!(
            affiliate_link("https://www.amazon.co.jp/dp/B0ABCDEF12", "mytag-22"),
            "https://www.amazon.co.jp/dp/B0ABCDEF12?tag=mytag-22"
        );
        assert_eq!(
            affiliate_link("https://www.amazon.co.jp/dp/B0ABCDEF12?ref=x", "mytag-22"),
            "https://www.amazon.co.jp/dp/B0ABCDEF12?ref=x&tag=mytag-22"
        );
    }
}
