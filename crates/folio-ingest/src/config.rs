//! Configuration management

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::gateway::{Backoff, RetryPolicy};
use crate::graph::Visibility;
use crate::orchestrator::DEFAULT_CONCURRENCY;
use crate::store::StorageConfig;
use crate::strategy::AssociationMethod;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default search index request timeout in seconds.
pub const DEFAULT_SOLR_TIMEOUT_SECS: u64 = 30;

/// Default bibliographic lookup timeout in seconds.
pub const DEFAULT_BIBDATA_TIMEOUT_SECS: u64 = 30;

/// Default maximum attempts per persistence write.
pub const DEFAULT_MAX_ATTEMPTS: u32 = crate::gateway::retry::DEFAULT_MAX_ATTEMPTS;

/// Default delay before the first retry, in milliseconds.
pub const DEFAULT_BACKOFF_MS: u64 = crate::gateway::retry::DEFAULT_BASE_DELAY_MS;

/// Ingest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub search: SearchConfig,
    pub bibdata: BibdataConfig,
    pub ingest: IngestConfig,
}

/// Search index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Solr core URL; an in-memory index is used when unset
    pub url: Option<Url>,
    pub timeout_secs: u64,
}

/// Bibliographic lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BibdataConfig {
    /// Catalog base URL; remote lookups fail as not found when unset
    pub url: Option<Url>,
    pub timeout_secs: u64,
}

/// Pipeline behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub method: AssociationMethod,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub backoff: Backoff,
    pub concurrency: usize,
    pub default_visibility: Visibility,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Enumerated settings are rejected rather than silently defaulted
fn env_choice<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr<Err = String>,
{
    match std::env::var(key) {
        Ok(value) => value.parse().map_err(|e: String| anyhow::anyhow!("{}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

fn env_url(key: &str) -> anyhow::Result<Option<Url>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            let url = Url::parse(value.trim()).with_context(|| format!("{} is not a valid URL", key))?;
            Ok(Some(url))
        },
        _ => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            storage: StorageConfig::from_env(),
            search: SearchConfig {
                url: env_url("SOLR_URL")?,
                timeout_secs: env_parse("SOLR_TIMEOUT_SECS", DEFAULT_SOLR_TIMEOUT_SECS),
            },
            bibdata: BibdataConfig {
                url: env_url("BIBDATA_URL")?,
                timeout_secs: env_parse("BIBDATA_TIMEOUT_SECS", DEFAULT_BIBDATA_TIMEOUT_SECS),
            },
            ingest: IngestConfig {
                method: env_choice("FILE_ASSOCIATION_METHOD", AssociationMethod::default())?,
                max_attempts: env_parse("INGEST_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
                backoff_ms: env_parse("INGEST_BACKOFF_MS", DEFAULT_BACKOFF_MS),
                backoff: env_choice("INGEST_BACKOFF", Backoff::default())?,
                concurrency: env_parse("INGEST_CONCURRENCY", DEFAULT_CONCURRENCY),
                default_visibility: env_choice("INGEST_DEFAULT_VISIBILITY", Visibility::default())?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ingest.max_attempts == 0 {
            anyhow::bail!("INGEST_MAX_ATTEMPTS must be at least 1");
        }

        if self.ingest.concurrency == 0 {
            anyhow::bail!("INGEST_CONCURRENCY must be at least 1");
        }

        if self.storage.bucket.trim().is_empty() {
            anyhow::bail!("S3 bucket cannot be empty");
        }

        if self.storage.access_key.is_some() != self.storage.secret_key.is_some() {
            tracing::warn!("Only one of S3_ACCESS_KEY / S3_SECRET_KEY is set - using the default credential chain");
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.ingest.max_attempts,
            Duration::from_millis(self.ingest.backoff_ms),
            self.ingest.backoff,
        )
    }

    pub fn solr_timeout(&self) -> Duration {
        Duration::from_secs(self.search.timeout_secs)
    }

    pub fn bibdata_timeout(&self) -> Duration {
        Duration::from_secs(self.bibdata.timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::from_env(),
            search: SearchConfig {
                url: None,
                timeout_secs: DEFAULT_SOLR_TIMEOUT_SECS,
            },
            bibdata: BibdataConfig {
                url: None,
                timeout_secs: DEFAULT_BIBDATA_TIMEOUT_SECS,
            },
            ingest: IngestConfig {
                method: AssociationMethod::default(),
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                backoff_ms: DEFAULT_BACKOFF_MS,
                backoff: Backoff::default(),
                concurrency: DEFAULT_CONCURRENCY,
                default_visibility: Visibility::default(),
            },
        }
    }
}
