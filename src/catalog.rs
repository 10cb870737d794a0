//! Loads postable items from the enriched catalog CSV.
//!
//! The catalog is the output of the enrichment pass: one row per title with
//! the columns `no, title, blurb, product_url, affiliate_url, short_url`.
//! Only `no`, `title`, `blurb`, and `short_url` matter here; rows without a
//! usable short URL are skipped because there is nothing to post for them.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::CatalogError;
use crate::models::PostableItem;

#[derive(Debug, Deserialize)]
struct CatalogRow {
    no: String,
    title: String,
    #[serde(default)]
    blurb: String,
    #[serde(default)]
    short_url: String,
}

/// Read the catalog and return the items that can actually be posted.
///
/// A missing or malformed file is fatal for the run: with no catalog there
/// is nothing to do.
pub fn load_items(path: &Path) -> Result<Vec<PostableItem>, CatalogError> {
    if !path.exists() {
        return Err(CatalogError::Missing(path.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut items = Vec::new();
    let mut skipped = 0usize;
    for row in reader.deserialize::<CatalogRow>() {
        let row = row.map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let item = PostableItem {
            id: row.no,
            title: row.title,
            blurb: row.blurb,
            short_url: Some(row.short_url),
        };
        if !item.has_short_url() {
            debug!(id = %item.id, title = %item.title, "Skipping catalog row without short URL");
            skipped += 1;
            continue;
        }
        items.push(item);
    }

    info!(
        count = items.len(),
        skipped,
        path = %path.display(),
        "Loaded postable catalog items"
    );
    Ok(items)
}
