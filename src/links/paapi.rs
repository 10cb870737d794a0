//! Product Advertising API product resolution.
//!
//! The store-search resolver breaks whenever the result markup shifts; the
//! PA-API `SearchItems` operation is the stable alternative for accounts
//! with API access. Requests are signed with AWS Signature V4: HMAC-SHA256
//! over the canonical request, keyed by a date-scoped signing chain.

use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

const HOST: &str = "webservices.amazon.co.jp";
const PATH: &str = "/paapi5/searchitems";
const REGION: &str = "us-west-2";
const SERVICE: &str = "ProductAdvertisingAPI";
const TARGET: &str = "com.amazon.paapi5.v1.ProductAdvertisingAPIv1.SearchItems";
const MARKETPLACE: &str = "www.amazon.co.jp";

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(rename = "ASIN")]
    asin: String,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(rename = "Items", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "SearchResult")]
    search_result: Option<SearchResult>,
}

/// Signed client for the `SearchItems` operation against the JP
/// marketplace.
#[derive(Debug)]
pub struct PaapiClient {
    access_key: String,
    secret_key: String,
    partner_tag: String,
    client: reqwest::Client,
}

impl PaapiClient {
    pub fn new(
        access_key: &str,
        secret_key: &str,
        partner_tag: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            partner_tag: partner_tag.to_string(),
            client,
        })
    }

    /// Resolve `title` to a product URL: Kindle store first, then a
    /// shortened title (listings are usually titled more tersely than the
    /// catalog), then a storewide search.
    #[instrument(level = "info", skip_all, fields(%title))]
    pub async fn resolve(&self, title: &str) -> Result<Option<String>, reqwest::Error> {
        if let Some(url) = self.search_once(title, "KindleStore").await? {
            return Ok(Some(url));
        }
        let short = shortened_title(title);
        if short != title {
            debug!(%short, "Retrying with shortened title");
            if let Some(url) = self.search_once(&short, "KindleStore").await? {
                return Ok(Some(url));
            }
        }
        debug!("Retrying across all categories");
        self.search_once(title, "All").await
    }

    async fn search_once(
        &self,
        keywords: &str,
        search_index: &str,
    ) -> Result<Option<String>, reqwest::Error> {
        let body = serde_json::json!({
            "Keywords": keywords,
            "SearchIndex": search_index,
            "ItemCount": 1,
            "PartnerTag": self.partner_tag,
            "PartnerType": "Associates",
            "Marketplace": MARKETPLACE,
            "Resources": ["ItemInfo.Title"],
        })
        .to_string();

        let now = chrono::Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let authorization = self.authorization_header(&body, &amz_date, &date_stamp);

        let response = self
            .client
            .post(format!("https://{HOST}{PATH}"))
            .header("Content-Type", "application/json; charset=utf-8")
            .header("Content-Encoding", "amz-1.0")
            .header("Host", HOST)
            .header("X-Amz-Date", amz_date)
            .header("X-Amz-Target", TARGET)
            .header("Authorization", authorization)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "SearchItems request rejected");
            return Ok(None);
        }
        let parsed: SearchResponse = response.json().await?;
        Ok(first_product_url(parsed))
    }

    /// Signature V4: canonical request, date-scoped string to sign, and a
    /// signing key derived by chaining HMACs over date, region, and
    /// service. Signed headers must match the request headers exactly.
    fn authorization_header(&self, body: &str, amz_date: &str, date_stamp: &str) -> String {
        let canonical_headers = format!(
            "content-encoding:amz-1.0\n\
             content-type:application/json; charset=utf-8\n\
             host:{HOST}\n\
             x-amz-date:{amz_date}\n\
             x-amz-target:{TARGET}\n"
        );
        let signed_headers = "content-encoding;content-type;host;x-amz-date;x-amz-target";
        let canonical_request = format!(
            "POST\n{PATH}\n\n{canonical_headers}\n{signed_headers}\n{}",
            sha256_hex(body.as_bytes())
        );

        let scope = format!("{date_stamp}/{REGION}/{SERVICE}/aws4_request");
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            sha256_hex(canonical_request.as_bytes())
        );

        let secret = format!("AWS4{}", self.secret_key);
        let k_date = hmac_sha256(secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, REGION.as_bytes());
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hex(&hmac_sha256(&k_signing, string_to_sign.as_bytes()));

        format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, \
             Signature={signature}",
            self.access_key
        )
    }
}

fn first_product_url(response: SearchResponse) -> Option<String> {
    response
        .search_result
        .and_then(|result| result.items.into_iter().next())
        .map(|item| format!("https://{MARKETPLACE}/dp/{}", item.asin))
}

/// Catalog titles often carry a subtitle after a colon or comma that the
/// listing does not; cut at the first separator and cap the length.
fn shortened_title(title: &str) -> String {
    let head = title.split(['：', ':', '、', '，']).next().unwrap_or(title);
    head.chars().take(20).collect()
}

fn sha256_hex(data: &[u8]) -> String {
    hex(&Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
