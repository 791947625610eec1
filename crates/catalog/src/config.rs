// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Result, SyncError};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MANIFEST_URL: &str = "https://static.openfoodfacts.org/data/delta/index.txt";

/// Catalog synchronization configuration, loaded from YAML
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CatalogConfig {
    pub feed: FeedConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub bulk: BulkSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FeedConfig {
    /// The index file listing the available delta files
    #[serde(default = "default_manifest_url")]
    pub manifest_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoreConfig {
    /// DuckDB database file
    pub path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SyncSettings {
    /// Record field holding the stable product identifier
    #[serde(default = "default_key_field")]
    pub key_field: String,
    /// Record field holding the modification time used as the watermark
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    /// Underscore-delimited token of a delta filename holding its timestamp
    #[serde(default = "default_timestamp_token")]
    pub timestamp_token: usize,
    /// Server-local time of day for the scheduled run, "HH:MM"
    #[serde(default = "default_daily_at")]
    pub daily_at: String,
    /// Parent directory for per-run download scratch space
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BulkSettings {
    /// Records per committed chunk during a snapshot load
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_manifest_url() -> String {
    DEFAULT_MANIFEST_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    600
}

fn default_key_field() -> String {
    "code".to_string()
}

fn default_timestamp_field() -> String {
    "last_modified_t".to_string()
}

fn default_timestamp_token() -> usize {
    1
}

fn default_daily_at() -> String {
    "03:30".to_string()
}

fn default_chunk_size() -> usize {
    50_000
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            key_field: default_key_field(),
            timestamp_field: default_timestamp_field(),
            timestamp_token: default_timestamp_token(),
            daily_at: default_daily_at(),
            scratch_dir: None,
        }
    }
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

impl SyncSettings {
    /// The configured run time as a `NaiveTime`
    pub fn daily_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.daily_at.trim(), "%H:%M").map_err(|e| {
            SyncError::Config(format!(
                "daily_at must be HH:MM, got '{}': {}",
                self.daily_at, e
            ))
        })
    }
}

/// Load configuration from YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CatalogConfig> {
    let content = std::fs::read_to_string(&path).map_err(|e| {
        SyncError::Config(format!(
            "Failed to read config file {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;

    parse_config(&content)
}

/// Parse and validate configuration text
pub fn parse_config(content: &str) -> Result<CatalogConfig> {
    let config: CatalogConfig = serde_yaml_ng::from_str(content)
        .map_err(|e| SyncError::Config(format!("Failed to parse YAML configuration: {}", e)))?;

    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub(crate) fn validate_config(config: &CatalogConfig) -> Result<()> {
    let manifest = url::Url::parse(&config.feed.manifest_url).map_err(|e| {
        SyncError::Config(format!(
            "manifest_url '{}' is not a valid URL: {}",
            config.feed.manifest_url, e
        ))
    })?;
    if manifest.cannot_be_a_base() {
        return Err(SyncError::Config(format!(
            "manifest_url '{}' cannot be used to locate delta files",
            config.feed.manifest_url
        )));
    }

    if config.feed.timeout_seconds == 0 {
        return Err(SyncError::Config(
            "timeout_seconds must be greater than 0".to_string(),
        ));
    }

    if config.store.path.as_os_str().is_empty() {
        return Err(SyncError::Config("store path cannot be empty".to_string()));
    }

    if config.sync.key_field.is_empty() {
        return Err(SyncError::Config("key_field cannot be empty".to_string()));
    }

    if config.sync.timestamp_field.is_empty() {
        return Err(SyncError::Config(
            "timestamp_field cannot be empty".to_string(),
        ));
    }

    config.sync.daily_time()?;

    if config.bulk.chunk_size == 0 {
        return Err(SyncError::Config(
            "chunk_size must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Write a starter configuration file
pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let example = r#"# Catalog synchronization configuration
feed:
  # Index of the delta files published by the feed
  manifest_url: https://static.openfoodfacts.org/data/delta/index.txt
  timeout_seconds: 600

store:
  # DuckDB database holding the catalog
  path: catalog.duckdb

sync:
  key_field: code
  timestamp_field: last_modified_t
  # Position of the timestamp among the underscore-separated filename tokens
  timestamp_token: 1
  # Server-local time of the daily run
  daily_at: "03:30"
  # scratch_dir: /var/tmp/catsync

bulk:
  chunk_size: 50000
"#;

    std::fs::write(&path, example).map_err(|e| {
        SyncError::Config(format!(
            "Failed to write config file {}: {}",
            path.as_ref().display(),
            e
        ))
    })
}
