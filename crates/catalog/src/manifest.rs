// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Feed manifest: the newline-separated list of delta filenames.
//!
//! Each filename embeds a timestamp as one of its underscore-separated
//! tokens, e.g. `products_1700000000_00001.jsonl.gz`.

use crate::error::{Result, SyncError};
use crate::feed::FeedClient;
use crate::models::ManifestEntry;
use diagnostics::*;
use url::Url;

/// Timestamp embedded in `filename` at underscore token `token`.
pub fn embedded_timestamp(filename: &str, token: usize) -> Option<i64> {
    filename.split('_').nth(token)?.trim().parse().ok()
}

/// Parse a manifest body, keeping feed order.
///
/// Lines without a parseable timestamp are skipped, as are names that
/// would escape the directory of the manifest or parse as a URL of their own.
pub fn parse_manifest(body: &str, token: usize, base: &Url) -> Vec<ManifestEntry> {
    let mut entries = Vec::new();

    for line in body.lines() {
        let filename = line.trim();
        if filename.is_empty() {
            continue;
        }

        let Some(timestamp) = embedded_timestamp(filename, token) else {
            warn!("Skipping manifest line without a timestamp: {filename}", filename: filename);
            continue;
        };

        if filename.contains(['/', '\\', ':']) || filename.starts_with('.') {
            warn!("Skipping manifest entry with a path component: {filename}", filename: filename);
            continue;
        }

        let url = match base.join(filename) {
            Ok(url) => url,
            Err(e) => {
                let reason = e.to_string();
                warn!("Skipping manifest entry {filename}: {reason}", filename: filename, reason: reason);
                continue;
            }
        };

        entries.push(ManifestEntry {
            filename: filename.to_string(),
            timestamp,
            url: url.to_string(),
        });
    }

    entries
}

/// Retrieves and parses the feed manifest
#[derive(Debug, Clone)]
pub struct ManifestFetcher {
    url: Url,
    timestamp_token: usize,
}

impl ManifestFetcher {
    pub fn new(manifest_url: &str, timestamp_token: usize) -> Result<Self> {
        let url = Url::parse(manifest_url).map_err(|e| {
            SyncError::Config(format!("invalid manifest URL '{manifest_url}': {e}"))
        })?;
        Ok(Self {
            url,
            timestamp_token,
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Fetch the manifest, in the order the feed lists it.
    pub async fn fetch(&self, client: &dyn FeedClient) -> Result<Vec<ManifestEntry>> {
        let body = client
            .fetch_text(self.url.as_str())
            .await
            .map_err(|source| SyncError::FeedUnavailable {
                url: self.url.to_string(),
                source,
            })?;

        if body.trim().is_empty() {
            return Err(SyncError::EmptyManifest {
                url: self.url.to_string(),
            });
        }

        let entries = parse_manifest(&body, self.timestamp_token, &self.url);
        let listed = entries.len();
        debug!("Manifest lists {listed} delta files", listed: listed);
        Ok(entries)
    }
}
