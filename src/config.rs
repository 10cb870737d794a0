//! Configuration for the posting bot and the enrichment pass.
//!
//! A [`BotConfig`] is constructed exactly once at process start (YAML file
//! plus CLI/environment overrides) and passed by reference into each
//! component. No component reads ambient global state.
//!
//! All date-keyed operations share one reference clock: `tz_offset_hours`
//! converts the host's UTC clock to the audience's local time, and that same
//! offset is used for the posting window, the daily quota, and the ledger's
//! notion of "today".

use std::fs;
use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;

/// Credentials for the outbound feed API. All five are required for a live
/// send; none are required in dry-run mode.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedCredentials {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub access_token_secret: Option<String>,
    #[serde(default)]
    pub bearer_token: Option<String>,
}

/// Settings for the affiliate-link enrichment pass.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichConfig {
    /// Amazon Associates tag appended to every product URL.
    #[serde(default)]
    pub affiliate_tag: Option<String>,
    /// Bitly API token. When absent, TinyURL is used instead.
    #[serde(default)]
    pub bitly_token: Option<String>,
    /// Product Advertising API access key. With both PA-API keys set,
    /// titles are resolved through the API, falling back to the store
    /// search per title; without them only the store search runs.
    #[serde(default)]
    pub paapi_access_key: Option<String>,
    #[serde(default)]
    pub paapi_secret_key: Option<String>,
    /// Pause between product searches, to stay under Amazon's rate limits.
    #[serde(default = "default_request_delay_secs")]
    pub request_delay_secs: u64,
    /// Timeout for each search / shortener request.
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            affiliate_tag: None,
            bitly_token: None,
            paapi_access_key: None,
            paapi_secret_key: None,
            request_delay_secs: default_request_delay_secs(),
            search_timeout_secs: default_search_timeout_secs(),
        }
    }
}

/// The complete configuration surface.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// First hour (inclusive, audience-local) at which posting is allowed.
    #[serde(default = "default_window_start")]
    pub window_start_hour: u32,
    /// Last hour (inclusive, audience-local) at which posting is allowed.
    #[serde(default = "default_window_end")]
    pub window_end_hour: u32,
    /// Maximum successful posts per calendar day.
    #[serde(default = "default_posts_per_day")]
    pub posts_per_day: u32,
    /// Lower bound for the pacing probability.
    #[serde(default = "default_min_probability")]
    pub min_posting_probability: f64,
    /// Upper bound for the pacing probability.
    #[serde(default = "default_max_probability")]
    pub max_posting_probability: f64,
    /// Hours to add to UTC to get the audience's local clock.
    #[serde(default = "default_tz_offset")]
    pub tz_offset_hours: i32,
    /// Display composed posts instead of sending them. Ledger recording
    /// still happens.
    #[serde(default)]
    pub dry_run: bool,
    /// Ordered set of message templates; `{blurb}` and `{short_url}` are
    /// substituted. One is chosen uniformly at random per post.
    #[serde(default = "default_templates")]
    pub templates: Vec<String>,
    /// Path of the posting-history ledger.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    /// Path of the enriched catalog CSV.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    /// Min/max minutes to sleep between attempts in the long-running mode.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: (u64, u64),
    #[serde(default)]
    pub credentials: FeedCredentials,
    #[serde(default)]
    pub enrich: EnrichConfig,
}

fn default_window_start() -> u32 {
    9
}
fn default_window_end() -> u32 {
    22
}
fn default_posts_per_day() -> u32 {
    9
}
fn default_min_probability() -> f64 {
    0.5
}
fn default_max_probability() -> f64 {
    0.9
}
fn default_tz_offset() -> i32 {
    9 // JST audience, UTC host
}
fn default_templates() -> Vec<String> {
    vec!["{blurb}\n\n{short_url}\n\n#KindleUnlimited".to_string()]
}
fn default_ledger_path() -> PathBuf {
    PathBuf::from("posting_history.json")
}
fn default_catalog_path() -> PathBuf {
    PathBuf::from("catalog_with_links.csv")
}
fn default_interval_minutes() -> (u64, u64) {
    (60, 120)
}
fn default_request_delay_secs() -> u64 {
    1
}
fn default_search_timeout_secs() -> u64 {
    10
}

impl Default for BotConfig {
    fn default() -> Self {
        // serde_yaml applies every #[serde(default)] to an empty document
        serde_yaml::from_str("{}").expect("empty config is valid")
    }
}

impl BotConfig {
    /// Load configuration from a YAML file, or defaults when `path` is None.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                let config: BotConfig =
                    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                        path: path.to_path_buf(),
                        source,
                    })?;
                info!(path = %path.display(), "Loaded configuration");
                config
            }
            None => {
                info!("No config file given; using defaults");
                BotConfig::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Structural validation, independent of run mode.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_start_hour > self.window_end_hour || self.window_end_hour > 23 {
            return Err(ConfigError::InvalidWindow {
                start: self.window_start_hour,
                end: self.window_end_hour,
            });
        }
        if self.tz_offset_hours.abs() > 23 {
            return Err(ConfigError::InvalidTzOffset(self.tz_offset_hours));
        }
        if self.min_posting_probability > self.max_posting_probability {
            return Err(ConfigError::InvalidProbabilityBounds {
                min: self.min_posting_probability,
                max: self.max_posting_probability,
            });
        }
        if self.templates.is_empty() {
            return Err(ConfigError::NoTemplates);
        }
        Ok(())
    }

    /// Checks that must hold before a live send is attempted. Dry-run skips
    /// these entirely.
    pub fn validate_for_send(&self) -> Result<(), ConfigError> {
        if self.dry_run {
            return Ok(());
        }
        let c = &self.credentials;
        for (name, value) in [
            ("api_key", &c.api_key),
            ("api_secret", &c.api_secret),
            ("access_token", &c.access_token),
            ("access_token_secret", &c.access_token_secret),
            ("bearer_token", &c.bearer_token),
        ] {
            match value {
                Some(v) if !v.is_empty() && !v.starts_with("your-") => {}
                _ => return Err(ConfigError::MissingCredential(name)),
            }
        }
        Ok(())
    }

    /// The single fixed offset used for every date-keyed operation.
    pub fn tz_offset(&self) -> FixedOffset {
        // validated to -23..=23 at load time
        FixedOffset::east_opt(self.tz_offset_hours * 3600).expect("offset within a day")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_production_settings() {
        let config = BotConfig::default();
        assert_eq!(config.window_start_hour, 9);
        assert_eq!(config.window_end_hour, 22);
        assert_eq!(config.posts_per_day, 9);
        assert_eq!(config.min_posting_probability, 0.5);
        assert_eq!(config.max_posting_probability, 0.9);
        assert_eq!(config.tz_offset_hours, 9);
        assert!(!config.dry_run);
        assert_eq!(config.templates.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_yaml_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "window_start_hour: 8\nwindow_end_hour: 21\nposts_per_day: 3\ndry_run: true\n"
        )
        .unwrap();

        let config = BotConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.window_start_hour, 8);
        assert_eq!(config.window_end_hour, 21);
        assert_eq!(config.posts_per_day, 3);
        assert!(config.dry_run);
        // untouched fields keep their defaults
        assert_eq!(config.tz_offset_hours, 9);
    }

    #[test]
    fn test_load_missing_file_is_fatal() {
        let err = BotConfig::load(Some(Path::new("/nonexistent/bot.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_invalid_window_rejected() {
        let mut config = BotConfig::default();
        config.window_start_hour = 23;
        config.window_end_hour = 9;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn test_empty_templates_rejected() {
        let mut config = BotConfig::default();
        config.templates.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoTemplates)));
    }

    #[test]
    fn test_placeholder_credentials_rejected_for_live_send() {
        let mut config = BotConfig::default();
        config.credentials.api_key = Some("your-x-api-key".to_string());
        config.credentials.api_secret = Some("secret".to_string());
        config.credentials.access_token = Some("token".to_string());
        config.credentials.access_token_secret = Some("token-secret".to_string());
        config.credentials.bearer_token = Some("bearer".to_string());

        let err = config.validate_for_send().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("api_key")));

        config.dry_run = true;
        assert!(config.validate_for_send().is_ok());
    }

    #[test]
    fn test_enrich_paapi_keys_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "enrich:\n  affiliate_tag: tag-22\n  paapi_access_key: AK\n  paapi_secret_key: SK\n"
        )
        .unwrap();

        let config = BotConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.enrich.affiliate_tag.as_deref(), Some("tag-22"));
        assert_eq!(config.enrich.paapi_access_key.as_deref(), Some("AK"));
        assert_eq!(config.enrich.paapi_secret_key.as_deref(), Some("SK"));
        // absent by default
        assert!(BotConfig::default().enrich.paapi_access_key.is_none());
    }

    #[test]
    fn test_tz_offset_negative() {
        let mut config = BotConfig::default();
        config.tz_offset_hours = -5;
        assert!(config.validate().is_ok());
        assert_eq!(config.tz_offset().local_minus_utc(), -5 * 3600);
    }
}
