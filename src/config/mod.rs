//! Configuration management for shelf-rotation
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::models::ProductStatus;
use crate::rotation::{BatchConfig, FetchOptions, MutatorConfig, SelectionMode, SorterConfig};
use crate::scheduler::trigger::{parse_cron, parse_timezone, TriggerConfig};
use crate::utils::retry::RetryPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Catalog API connection
    pub catalog: CatalogConfig,

    /// Rotation job
    #[serde(default)]
    pub rotation: RotationConfig,

    /// Tag sweep job; disabled when absent
    #[serde(default)]
    pub sweep: Option<SweepConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Catalog API connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// GraphQL admin endpoint URL
    pub endpoint: String,

    /// Admin API access token; may come from `SHELF_ACCESS_TOKEN` instead
    #[serde(default)]
    pub access_token: String,

    /// Rate limit (requests per second)
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_requests_per_second() -> u32 {
    2
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Rotation job settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Cron rule, 6-field (with seconds) or 5-field
    pub cron: String,

    /// IANA timezone the rule is evaluated in
    pub timezone: String,

    /// Maximum number of products active after a run
    pub active_limit: usize,

    pub page_size: usize,
    pub page_delay_ms: u64,
    pub batch_size: usize,
    pub concurrency: usize,
    pub inter_batch_delay_ms: u64,

    /// Retries after the first attempt when throttled
    pub max_retries: u32,
    pub retry_backoff_ms: u64,

    pub selection: SelectionMode,

    /// Fixed RNG seed for reproducible selection
    pub selection_seed: Option<u64>,

    /// Collections reordered after each run
    pub collections: Vec<String>,
    pub reorder_chunk_size: usize,

    /// State store key of the next-run marker
    pub next_run_marker: Option<String>,

    /// Metaobject field holding the marker value
    pub next_run_field: String,

    /// Minutes added to the current time when writing the marker
    pub next_run_offset_minutes: i64,

    /// `namespace.key` of the assignment counter metafield
    pub assignment_metafield: String,

    /// Drafts carrying any of these tags are never activated
    pub exclude_tags: Vec<String>,

    /// Run once immediately when the service starts
    pub run_on_startup: bool,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            cron: "0 */2 * * * *".to_string(),
            timezone: "UTC".to_string(),
            active_limit: 3000,
            page_size: 250,
            page_delay_ms: 100,
            batch_size: 50,
            concurrency: 3,
            inter_batch_delay_ms: 500,
            max_retries: 3,
            retry_backoff_ms: 2000,
            selection: SelectionMode::Weighted,
            selection_seed: None,
            collections: Vec::new(),
            reorder_chunk_size: 250,
            next_run_marker: None,
            next_run_field: "datetime".to_string(),
            next_run_offset_minutes: 0,
            assignment_metafield: "custom.assign".to_string(),
            exclude_tags: Vec::new(),
            run_on_startup: false,
        }
    }
}

impl RotationConfig {
    pub fn trigger(&self) -> TriggerConfig {
        TriggerConfig::new(&self.cron, &self.timezone).with_run_on_startup(self.run_on_startup)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::new(self.page_size, Duration::from_millis(self.page_delay_ms))
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch_size,
            concurrency: self.concurrency,
            inter_batch_delay: Duration::from_millis(self.inter_batch_delay_ms),
            retry: RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_backoff_ms)),
        }
    }

    pub fn sorter_config(&self) -> SorterConfig {
        SorterConfig {
            chunk_size: self.reorder_chunk_size,
            fetch: self.fetch_options(),
        }
    }

    /// Split `assignment_metafield` into namespace and key
    pub fn assignment_metafield(&self) -> Result<(String, String)> {
        match self.assignment_metafield.split_once('.') {
            Some((ns, key)) if !ns.is_empty() && !key.is_empty() => {
                Ok((ns.to_string(), key.to_string()))
            }
            _ => anyhow::bail!(
                "assignment_metafield must be 'namespace.key', got '{}'",
                self.assignment_metafield
            ),
        }
    }
}

/// Tag sweep job settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub cron: String,

    /// Tag removed from matching products
    pub tag: String,

    /// Only products with this status are swept
    pub status: ProductStatus,

    pub batch_size: usize,
    pub concurrency: usize,

    /// Pause between write chunks
    pub throttle_ms: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 * * * *".to_string(),
            tag: "no-rotation".to_string(),
            status: ProductStatus::Draft,
            batch_size: 25,
            concurrency: 1,
            throttle_ms: 150,
        }
    }
}

impl SweepConfig {
    pub fn mutator_config(&self) -> MutatorConfig {
        let throttle = Duration::from_millis(self.throttle_ms);
        MutatorConfig {
            batch_size: self.batch_size,
            concurrency: self.concurrency,
            inter_batch_delay: throttle,
            inter_chunk_delay: throttle,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = RotationConfig::default();

        let endpoint = std::env::var("SHELF_CATALOG_ENDPOINT").unwrap_or_default();
        let access_token = std::env::var("SHELF_ACCESS_TOKEN").unwrap_or_default();

        let rotation = RotationConfig {
            cron: std::env::var("SHELF_ROTATION_CRON").unwrap_or(defaults.cron),
            timezone: std::env::var("SHELF_TIMEZONE").unwrap_or(defaults.timezone),
            page_size: env_parse("SHELF_PAGE_SIZE").unwrap_or(defaults.page_size),
            batch_size: env_parse("SHELF_BATCH_SIZE").unwrap_or(defaults.batch_size),
            concurrency: env_parse("SHELF_CONCURRENCY").unwrap_or(defaults.concurrency),
            selection: env_parse("SHELF_SELECTION").unwrap_or(defaults.selection),
            selection_seed: env_parse("SHELF_SELECTION_SEED"),
            collections: env_list("SHELF_COLLECTIONS").unwrap_or_default(),
            next_run_marker: std::env::var("SHELF_NEXT_RUN_MARKER").ok(),
            next_run_offset_minutes: env_parse("SHELF_NEXT_RUN_OFFSET_MINUTES")
                .unwrap_or(defaults.next_run_offset_minutes),
            exclude_tags: env_list("SHELF_EXCLUDE_TAGS").unwrap_or_default(),
            run_on_startup: env_parse("SHELF_RUN_ON_STARTUP").unwrap_or(defaults.run_on_startup),
            ..RotationConfig::default()
        };

        let sweep = std::env::var("SHELF_SWEEP_CRON").ok().map(|cron| {
            let defaults = SweepConfig::default();
            SweepConfig {
                cron,
                tag: std::env::var("SHELF_SWEEP_TAG").unwrap_or(defaults.tag),
                ..SweepConfig::default()
            }
        });

        let mut config = Self {
            catalog: CatalogConfig {
                endpoint,
                access_token,
                requests_per_second: env_parse("SHELF_REQUESTS_PER_SECOND")
                    .unwrap_or_else(default_requests_per_second),
                request_timeout_secs: env_parse("SHELF_REQUEST_TIMEOUT")
                    .unwrap_or_else(default_request_timeout_secs),
            },
            rotation,
            sweep,
            logging: LoggingConfig {
                level: std::env::var("SHELF_LOG_LEVEL").unwrap_or_else(|_| String::from("info")),
                format: std::env::var("SHELF_LOG_FORMAT").unwrap_or_else(|_| String::from("text")),
            },
        };
        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;
        config.apply_env_overrides();

        Ok(config)
    }

    /// File when given, environment otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_env(),
        }
    }

    /// Overrides honored regardless of the config source
    fn apply_env_overrides(&mut self) {
        if let Some(limit) = env_parse::<usize>("ROTATION_ACTIVE_LIMIT") {
            self.rotation.active_limit = limit;
        }
        if let Ok(token) = std::env::var("SHELF_ACCESS_TOKEN") {
            if self.catalog.access_token.is_empty() {
                self.catalog.access_token = token;
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let endpoint = url::Url::parse(&self.catalog.endpoint)
            .with_context(|| format!("Invalid catalog endpoint '{}'", self.catalog.endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            anyhow::bail!("catalog endpoint must be http(s)");
        }

        if self.catalog.access_token.trim().is_empty() {
            anyhow::bail!("access_token must be set");
        }

        if self.catalog.requests_per_second == 0 {
            anyhow::bail!("requests_per_second must be greater than 0");
        }

        let rotation = &self.rotation;
        if rotation.active_limit == 0 {
            anyhow::bail!("active_limit must be greater than 0");
        }
        if rotation.page_size == 0 || rotation.page_size > 250 {
            anyhow::bail!("page_size must be between 1 and 250");
        }
        if rotation.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }
        if rotation.concurrency == 0 {
            anyhow::bail!("concurrency must be greater than 0");
        }
        if rotation.reorder_chunk_size == 0 || rotation.reorder_chunk_size > 250 {
            anyhow::bail!("reorder_chunk_size must be between 1 and 250");
        }
        rotation.assignment_metafield()?;
        parse_cron(&rotation.cron)?;
        parse_timezone(&rotation.timezone)?;

        if let Some(sweep) = &self.sweep {
            if sweep.tag.trim().is_empty() {
                anyhow::bail!("sweep tag must not be empty");
            }
            if sweep.batch_size == 0 || sweep.concurrency == 0 {
                anyhow::bail!("sweep batch_size and concurrency must be greater than 0");
            }
            parse_cron(&sweep.cron)?;
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog.request_timeout_secs)
    }
}
