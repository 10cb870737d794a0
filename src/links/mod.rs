//! Affiliate link construction: product resolution and URL shortening.
//!
//! These are the two collaborators the posting bot consumes indirectly
//! through the enriched catalog:
//!
//! - [`resolver`]: searches the Amazon Kindle store for a title, extracts
//!   the first product page, and appends the affiliate tag
//! - [`paapi`]: resolves titles through the Product Advertising API when
//!   API keys are configured, with the store search as the fallback
//! - [`shortener`]: shortens an affiliate URL via Bitly (when a token is
//!   configured) or TinyURL, falling back to the original URL on failure
//!
//! All are stateless request/response glue; failures are logged and leave
//! the corresponding catalog columns empty rather than aborting the pass.

pub mod paapi;
pub mod resolver;
pub mod shortener;
