//! Outbound feed client for X (Twitter).
//!
//! [`FeedClient`] is the seam the dispatcher posts through; [`XApiClient`]
//! is the real implementation, signing each request with OAuth 1.0a
//! user-context credentials (HMAC-SHA1 over the percent-encoded base
//! string) and POSTing to the v2 tweet endpoint.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Deserialize;
use sha1::Sha1;
use tracing::{info, instrument, warn};

use crate::config::FeedCredentials;
use crate::error::SendError;

type HmacSha1 = Hmac<Sha1>;

const TWEET_ENDPOINT: &str = "https://api.twitter.com/2/tweets";

/// Live sends are synchronous with a timeout; a hung send must not stall a
/// scheduled invocation indefinitely.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// RFC 3986 unreserved characters pass through; everything else is encoded.
/// OAuth 1.0a requires exactly this set for both the base string and the
/// header values.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Anything that can publish a message to the feed.
pub trait FeedClient {
    /// Send `text` as a single post; returns the feed's id for it.
    async fn publish(&self, text: &str) -> Result<String, SendError>;
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TweetResponse {
    data: Option<TweetData>,
}

/// OAuth 1.0a user-context client for the X v2 API.
#[derive(Debug)]
pub struct XApiClient {
    api_key: String,
    api_secret: String,
    access_token: String,
    access_token_secret: String,
    client: reqwest::Client,
}

impl XApiClient {
    /// Build a client from validated credentials. Callers must have run
    /// `BotConfig::validate_for_send` first; absent fields become empty
    /// strings and would fail at the API.
    pub fn new(credentials: &FeedCredentials, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key: credentials.api_key.clone().unwrap_or_default(),
            api_secret: credentials.api_secret.clone().unwrap_or_default(),
            access_token: credentials.access_token.clone().unwrap_or_default(),
            access_token_secret: credentials.access_token_secret.clone().unwrap_or_default(),
            client,
        })
    }

    fn authorization_header(&self, method: &str, url: &str, timestamp: u64, nonce: &str) -> String {
        let timestamp_str = timestamp.to_string();
        let oauth_params: [(&str, &str); 6] = [
            ("oauth_consumer_key", self.api_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp_str.as_str()),
            ("oauth_token", self.access_token.as_str()),
            ("oauth_version", "1.0"),
        ];

        let base = signature_base_string(method, url, &oauth_params);
        let signing_key = format!(
            "{}&{}",
            percent_encode(&self.api_secret),
            percent_encode(&self.access_token_secret)
        );
        let mut mac =
            HmacSha1::new_from_slice(signing_key.as_bytes()).expect("HMAC accepts any key length");
        mac.update(base.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        let mut header_params: Vec<(String, String)> = oauth_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        header_params.push(("oauth_signature".to_string(), signature));
        header_params.sort();

        let fields = header_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {fields}")
    }
}

impl FeedClient for XApiClient {
    #[instrument(level = "info", skip_all)]
    async fn publish(&self, text: &str) -> Result<String, SendError> {
        let timestamp = chrono::Utc::now().timestamp() as u64;
        let nonce: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let authorization = self.authorization_header("POST", TWEET_ENDPOINT, timestamp, &nonce);

        let response = self
            .client
            .post(TWEET_ENDPOINT)
            .header("Authorization", authorization)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "Feed rejected the post");
            return Err(SendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TweetResponse = response.json().await?;
        let id = parsed.data.map(|d| d.id).ok_or(SendError::MalformedResponse)?;
        info!(post_id = %id, "Posted to feed");
        Ok(id)
    }
}

fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

/// The OAuth 1.0a signature base string: method, URL, and the sorted,
/// percent-encoded parameter string, each component encoded again.
fn signature_base_string(method: &str, url: &str, params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();
    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{}&{}&{}",
        method,
        percent_encode(url),
        percent_encode(&param_string)
    )
}
