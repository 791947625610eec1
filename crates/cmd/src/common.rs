// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use catalog::{CatalogConfig, DeltaApplier, DuckDbSink, FeedClient, HttpFeedClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "CATSYNC_CONFIG";

/// Configuration file used when neither `--config` nor `CATSYNC_CONFIG` is given
pub const DEFAULT_CONFIG: &str = "catsync.yaml";

/// Everything a command needs to find its configuration and store
#[derive(Debug, Clone)]
pub struct CatalogContext {
    pub config_path: PathBuf,
}

impl CatalogContext {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load and validate the configuration file
    pub fn load_config(&self) -> Result<CatalogConfig> {
        catalog::load_config(&self.config_path).with_context(|| {
            format!(
                "Failed to load configuration from {}",
                self.config_path.display()
            )
        })
    }

    /// The store path, with relative paths taken from the config file's directory
    pub fn store_path(&self, config: &CatalogConfig) -> PathBuf {
        resolve_relative(&self.config_path, &config.store.path)
    }

    /// Open (creating if needed) the configured DuckDB store
    pub fn open_store(&self, config: &CatalogConfig) -> Result<Arc<DuckDbSink>> {
        let path = self.store_path(config);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let sink = DuckDbSink::open(&path, &config.sync.timestamp_field)
            .with_context(|| format!("Failed to open catalog store {}", path.display()))?;
        Ok(Arc::new(sink))
    }

    /// Delta applier wired to the HTTP feed and the configured store
    pub fn delta_applier(&self, config: &CatalogConfig) -> Result<DeltaApplier> {
        let feed: Arc<dyn FeedClient> = Arc::new(HttpFeedClient::new(config.feed.timeout_seconds)?);
        let sink = self.open_store(config)?;

        let mut config = config.clone();
        config.sync.scratch_dir = config
            .sync
            .scratch_dir
            .as_ref()
            .map(|dir| resolve_relative(&self.config_path, dir));

        Ok(DeltaApplier::from_config(&config, feed, sink)?)
    }
}

fn resolve_relative(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match config_path.parent() {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    }
}
