//! Catalog enrichment: title in, affiliate short link out.
//!
//! Reads the raw catalog CSV (`no, title, blurb`), resolves each title to
//! an Amazon product page, appends the affiliate tag, shortens the result,
//! and writes an enriched CSV with `product_url`, `affiliate_url`, and
//! `short_url` columns. Per-title failures leave those columns empty and
//! the pass continues; only an unreadable input or unwritable output is
//! fatal.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::config::EnrichConfig;
use crate::error::EnrichError;
use crate::links::paapi::PaapiClient;
use crate::links::{resolver, shortener};

#[derive(Debug, Deserialize)]
struct InputRow {
    no: String,
    title: String,
    #[serde(default)]
    blurb: String,
}

#[derive(Debug, Serialize)]
struct EnrichedRow {
    no: String,
    title: String,
    blurb: String,
    product_url: String,
    affiliate_url: String,
    short_url: String,
}

/// Counts reported at the end of an enrichment pass.
#[derive(Debug, Default)]
pub struct EnrichReport {
    pub total: usize,
    pub resolved: usize,
}

/// Enrich every row of `input` into `output`.
#[instrument(level = "info", skip_all, fields(input = %input.display(), output = %output.display()))]
pub async fn process_catalog(
    input: &Path,
    output: &Path,
    config: &EnrichConfig,
) -> Result<EnrichReport, EnrichError> {
    let tag = config
        .affiliate_tag
        .as_deref()
        .ok_or(EnrichError::MissingAffiliateTag)?;

    if !input.exists() {
        return Err(EnrichError::Missing(input.to_path_buf()));
    }
    let mut reader = csv::Reader::from_path(input).map_err(|source| EnrichError::Read {
        path: input.to_path_buf(),
        source,
    })?;
    let rows = reader
        .deserialize::<InputRow>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| EnrichError::Read {
            path: input.to_path_buf(),
            source,
        })?;

    let client = reqwest::Client::builder()
        .user_agent(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
        )
        .timeout(Duration::from_secs(config.search_timeout_secs))
        .build()?;

    let paapi = match (&config.paapi_access_key, &config.paapi_secret_key) {
        (Some(access_key), Some(secret_key)) => Some(PaapiClient::new(
            access_key,
            secret_key,
            tag,
            Duration::from_secs(config.search_timeout_secs),
        )?),
        _ => None,
    };

    let mut writer = csv::Writer::from_path(output).map_err(|source| EnrichError::Write {
        path: output.to_path_buf(),
        source,
    })?;

    let mut report = EnrichReport {
        total: rows.len(),
        resolved: 0,
    };
    info!(total = report.total, "Starting catalog enrichment");

    for (i, row) in rows.into_iter().enumerate() {
        info!(index = i + 1, total = report.total, title = %row.title, "Resolving title");

        let product_url = resolve_product(&client, paapi.as_ref(), &row.title).await;

        let (affiliate_url, short_url) = match &product_url {
            Some(url) => {
                let affiliate = resolver::affiliate_link(url, tag);
                let short =
                    shortener::shorten(&client, &affiliate, config.bitly_token.as_deref()).await;
                report.resolved += 1;
                (affiliate, short)
            }
            None => (String::new(), String::new()),
        };

        writer
            .serialize(EnrichedRow {
                no: row.no,
                title: row.title,
                blurb: row.blurb,
                product_url: product_url.unwrap_or_default(),
                affiliate_url,
                short_url,
            })
            .map_err(|source| EnrichError::Write {
                path: output.to_path_buf(),
                source,
            })?;

        // stay under the retailer's rate limits
        sleep(Duration::from_secs(config.request_delay_secs)).await;
    }

    writer.flush().map_err(|source| EnrichError::Write {
        path: output.to_path_buf(),
        source: csv::Error::from(source),
    })?;

    info!(
        total = report.total,
        resolved = report.resolved,
        "Catalog enrichment complete"
    );
    Ok(report)
}

/// Resolve one title, preferring the PA-API when configured and falling
/// back to the store search when it errors or finds nothing. Failures of
/// both strategies leave the row unlinked.
async fn resolve_product(
    client: &reqwest::Client,
    paapi: Option<&PaapiClient>,
    title: &str,
) -> Option<String> {
    if let Some(api) = paapi {
        match api.resolve(title).await {
            Ok(Some(url)) => return Some(url),
            Ok(None) => debug!(%title, "No API match; falling back to store search"),
            Err(e) => warn!(%title, error = %e, "API search failed; falling back to store search"),
        }
    }
    match resolver::search_kindle_store(client, title).await {
        Ok(url) => url,
        Err(e) => {
            warn!(%title, error = %e, "Product search failed; leaving row unlinked");
            None
        }
    }
}
