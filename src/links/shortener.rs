//! URL shortening via Bitly or TinyURL.
//!
//! Shortening is best-effort: any failure returns the original URL so the
//! enrichment pass never loses a link over a shortener outage.

use serde::Deserialize;
use tracing::{info, instrument, warn};

const TINYURL_API: &str = "https://tinyurl.com/api-create.php";
const BITLY_API: &str = "https://api-ssl.bitly.com/v4/shorten";

#[derive(Debug, Deserialize)]
struct BitlyResponse {
    link: String,
}

/// Shorten `url`, preferring Bitly when a token is configured.
#[instrument(level = "info", skip_all)]
pub async fn shorten(client: &reqwest::Client, url: &str, bitly_token: Option<&str>) -> String {
    let result = match bitly_token {
        Some(token) => shorten_bitly(client, url, token).await,
        None => shorten_tinyurl(client, url).await,
    };
    match result {
        Ok(short) => {
            info!(%short, "Shortened URL");
            short
        }
        Err(e) => {
            warn!(error = %e, %url, "URL shortening failed; keeping original");
            url.to_string()
        }
    }
}

async fn shorten_tinyurl(client: &reqwest::Client, url: &str) -> Result<String, reqwest::Error> {
    let response = client
        .get(TINYURL_API)
        .query(&[("url", url)])
        .send()
        .await?
        .error_for_status()?;
    response.text().await.map(|s| s.trim().to_string())
}

async fn shorten_bitly(
    client: &reqwest::Client,
    url: &str,
    token: &str,
) -> Result<String, reqwest::Error> {
    let response = client
        .post(BITLY_API)
        .bearer_auth(token)
        .json(&serde_json::json!({ "long_url": url }))
        .send()
        .await?
        .error_for_status()?;
    let parsed: BitlyResponse = response.json().await?;
    Ok(parsed.link)
}
