//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PELICAN_API_URL` - Base URL of the recommendation platform API
//!
//! ## Optional
//! - `PELICAN_DATABASE_URL` - `SQLite` database URL (default: `sqlite://pelican.db`)
//! - `PELICAN_CATALOG_FEED` - Path to the JSON catalog feed consumed by the worker
//! - `PELICAN_ACCOUNTS` - Store-to-account map, `store:merchant:token` triples
//!   separated by commas (e.g. `1:merchant-a:tok-a,2:merchant-b:tok-b`)
//! - `PELICAN_STATUS_HOST` - Status endpoint bind address (default: 127.0.0.1)
//! - `PELICAN_STATUS_PORT` - Status endpoint port (default: 3005)
//! - `PELICAN_UPSERT_TIMEOUT_SECS` - Upsert response timeout (default: 60)
//! - `PELICAN_DELETE_TIMEOUT_SECS` - Delete response timeout (default: 30)
//! - `PELICAN_INVALIDATE_PAGE_SIZE` - Invalidation page size (default: 100)
//! - `PELICAN_REBUILD_PAGE_SIZE` - Rebuild page size (default: 100)
//! - `PELICAN_SYNC_BATCH_SIZE` - Upsert batch size (default: 50)
//! - `PELICAN_QUEUE_CHUNK_SIZE` - Queue fan-out chunk size (default: 100)
//! - `PELICAN_MEMORY_LIMIT_MB` - Memory limit in MiB (default: 1024)
//! - `PELICAN_MEMORY_MAX_PERCENT` - Allowed share of the limit (default: 80)
//! - `PELICAN_SWEEP_INTERVAL_SECS` - Seconds between sweep passes (default: 300)
//! - `PELICAN_ACCOUNT_CACHE_TTL_SECS` - Account lookup cache TTL (default: 60)
//! - `PELICAN_CUSTOM_ATTRIBUTES` - Comma-separated extra attribute codes
//!   exported as custom fields
//! - `PELICAN_TAG1_ATTRIBUTES` / `PELICAN_TAG2_ATTRIBUTES` /
//!   `PELICAN_TAG3_ATTRIBUTES` - Attribute codes feeding the tag groups
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use pelican_core::StoreId;

use crate::api::AccountCredentials;
use crate::builder::BuilderConfig;

const DEFAULT_DATABASE_URL: &str = "sqlite://pelican.db";
const DEFAULT_STATUS_PORT: u16 = 3005;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `SQLite` database URL.
    pub database_url: String,
    /// JSON catalog feed path for the worker's feed mode.
    pub catalog_feed: Option<PathBuf>,
    /// Status endpoint bind address.
    pub status_host: IpAddr,
    /// Status endpoint port.
    pub status_port: u16,
    /// Recommendation API base URL.
    pub api_base_url: Url,
    /// Upsert response timeout.
    pub upsert_timeout: Duration,
    /// Delete response timeout.
    pub delete_timeout: Duration,
    /// Store-to-account map.
    pub accounts: Vec<(StoreId, AccountCredentials)>,
    /// Invalidation page size.
    pub invalidate_page_size: usize,
    /// Rebuild page size.
    pub rebuild_page_size: usize,
    /// Upsert batch size.
    pub sync_batch_size: usize,
    /// Queue fan-out chunk size.
    pub queue_chunk_size: usize,
    /// Memory limit in MiB for batch runs.
    pub memory_limit_mb: u64,
    /// Allowed share of the memory limit, in percent.
    pub memory_max_percent: f64,
    /// Interval between sweep passes.
    pub sweep_interval: Duration,
    /// Account lookup cache TTL.
    pub account_cache_ttl: Duration,
    /// Extra attribute codes exported as custom fields.
    pub custom_attributes: Vec<String>,
    /// Attribute codes feeding the three tag groups.
    pub tag_attributes: [Vec<String>; 3],
    /// Sentry error tracking DSN (optional).
    pub sentry_dsn: Option<String>,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing or malformed variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base_url = parse(&require("PELICAN_API_URL")?, "PELICAN_API_URL")?;

        Ok(Self {
            database_url: optional("PELICAN_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            catalog_feed: optional("PELICAN_CATALOG_FEED").map(PathBuf::from),
            status_host: parse_or("PELICAN_STATUS_HOST", IpAddr::from([127, 0, 0, 1]))?,
            status_port: parse_or("PELICAN_STATUS_PORT", DEFAULT_STATUS_PORT)?,
            api_base_url,
            upsert_timeout: Duration::from_secs(parse_or("PELICAN_UPSERT_TIMEOUT_SECS", 60)?),
            delete_timeout: Duration::from_secs(parse_or("PELICAN_DELETE_TIMEOUT_SECS", 30)?),
            accounts: parse_accounts(optional("PELICAN_ACCOUNTS").as_deref().unwrap_or(""))?,
            invalidate_page_size: parse_or("PELICAN_INVALIDATE_PAGE_SIZE", 100)?,
            rebuild_page_size: parse_or("PELICAN_REBUILD_PAGE_SIZE", 100)?,
            sync_batch_size: parse_or("PELICAN_SYNC_BATCH_SIZE", 50)?,
            queue_chunk_size: parse_or("PELICAN_QUEUE_CHUNK_SIZE", 100)?,
            memory_limit_mb: parse_or("PELICAN_MEMORY_LIMIT_MB", 1024)?,
            memory_max_percent: parse_or("PELICAN_MEMORY_MAX_PERCENT", 80.0)?,
            sweep_interval: Duration::from_secs(parse_or("PELICAN_SWEEP_INTERVAL_SECS", 300)?),
            account_cache_ttl: Duration::from_secs(parse_or(
                "PELICAN_ACCOUNT_CACHE_TTL_SECS",
                60,
            )?),
            custom_attributes: list(optional("PELICAN_CUSTOM_ATTRIBUTES").as_deref()),
            tag_attributes: [
                list(optional("PELICAN_TAG1_ATTRIBUTES").as_deref()),
                list(optional("PELICAN_TAG2_ATTRIBUTES").as_deref()),
                list(optional("PELICAN_TAG3_ATTRIBUTES").as_deref()),
            ],
            sentry_dsn: optional("SENTRY_DSN"),
        })
    }

    /// The builder settings carried by this configuration.
    #[must_use]
    pub fn builder_config(&self) -> BuilderConfig {
        let mut config = BuilderConfig::default();
        config.custom_attributes = self.custom_attributes.clone();
        let [tags1, tags2, tags3] = self.tag_attributes.clone();
        if !tags1.is_empty() {
            config.tag1_attributes = tags1;
        }
        config.tag2_attributes = tags2;
        config.tag3_attributes = tags3;
        config
    }
}

fn require(name: &str) -> Result<String, ConfigError> {
    optional(name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn parse<T: std::str::FromStr>(raw: &str, name: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|err| ConfigError::InvalidEnvVar(name.to_string(), format!("{err}")))
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => parse(&raw, name),
        None => Ok(default),
    }
}

fn list(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(ToString::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Parse `store:merchant:token` triples separated by commas.
fn parse_accounts(raw: &str) -> Result<Vec<(StoreId, AccountCredentials)>, ConfigError> {
    let mut accounts = Vec::new();
    for triple in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let mut parts = triple.splitn(3, ':');
        let (Some(store), Some(merchant), Some(token)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(ConfigError::InvalidEnvVar(
                "PELICAN_ACCOUNTS".to_string(),
                format!("expected store:merchant:token, got {triple:?}"),
            ));
        };
        let store_id: i64 = parse(store, "PELICAN_ACCOUNTS")?;
        accounts.push((
            StoreId::new(store_id),
            AccountCredentials {
                merchant_id: merchant.to_string(),
                // The merchant's storefront domain is confirmed during
                // account linking; the API derives it from the merchant id.
                domain: merchant.to_string(),
                api_token: SecretString::from(token.to_string()),
            },
        ));
    }
    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accounts_parse_from_triples() {
        let accounts = parse_accounts("1:merchant-a:tok-a, 2:merchant-b:tok-b").unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].0, StoreId::new(1));
        assert_eq!(accounts[0].1.merchant_id, "merchant-a");
        assert_eq!(accounts[1].0, StoreId::new(2));
    }

    #[test]
    fn malformed_account_triple_is_rejected() {
        assert!(parse_accounts("1:merchant-only").is_err());
        assert!(parse_accounts("not-a-number:m:t").is_err());
        assert!(parse_accounts("").unwrap().is_empty());
    }

    #[test]
    fn lists_split_and_trim() {
        assert_eq!(
            list(Some("color, size ,, material")),
            vec!["color".to_string(), "size".to_string(), "material".to_string()]
        );
        assert!(list(None).is_empty());
    }
}
