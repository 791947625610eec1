// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::error::FeedError;
use async_trait::async_trait;
use diagnostics::*;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Network side of the feed: a small text fetch and a streamed download.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch a small text resource such as the manifest.
    async fn fetch_text(&self, url: &str) -> Result<String, FeedError>;

    /// Stream `url` into `destination`, returning the bytes written.
    async fn download(&self, url: &str, destination: &Path) -> Result<u64, FeedError>;
}

/// Async HTTP feed client
#[derive(Clone)]
pub struct HttpFeedClient {
    http_client: reqwest::Client,
}

impl HttpFeedClient {
    pub fn new(timeout_seconds: u64) -> Result<Self, FeedError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("catsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Transport {
                url: String::new(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self { http_client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FeedError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FeedError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_text(&self, url: &str) -> Result<String, FeedError> {
        debug!("Fetching {url}", url: url);
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|e| FeedError::Transport {
                url: url.to_string(),
                reason: format!("failed to read response body: {e}"),
            })
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<u64, FeedError> {
        let io_err = |source| FeedError::Io {
            path: destination.to_path_buf(),
            source,
        };

        let mut response = self.get(url).await?;
        let mut file = tokio::fs::File::create(destination).await.map_err(io_err)?;

        let mut bytes: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(|e| FeedError::Transport {
            url: url.to_string(),
            reason: format!("transfer interrupted after {bytes} bytes: {e}"),
        })? {
            file.write_all(&chunk).await.map_err(io_err)?;
            bytes += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;

        debug!("Downloaded {bytes} bytes from {url}", bytes: bytes, url: url);
        Ok(bytes)
    }
}
