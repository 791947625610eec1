// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Incremental delta application.
//!
//! A run resolves the watermark from the store, walks the manifest newest
//! first, and applies every file whose embedded timestamp is above the
//! watermark. Each file is one atomic upsert; the first failure ends the run
//! and leaves the store as it was before that file. The next run recomputes
//! the watermark and picks up from there.

use crate::checkpoint::resolve_watermark;
use crate::config::CatalogConfig;
use crate::error::{Result, SyncError};
use crate::feed::FeedClient;
use crate::manifest::ManifestFetcher;
use crate::models::{ManifestEntry, SyncReport};
use crate::sink::StorageSink;
use crate::transform::RecordTransform;
use async_trait::async_trait;
use diagnostics::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Anything the sync trigger can run on a schedule.
#[async_trait]
pub trait SyncJob: Send + Sync {
    async fn run(&self) -> Result<SyncReport>;
}

/// A downloaded delta file, removed when dropped.
///
/// Dropping happens on success, on `?` early returns and when the run's
/// future is cancelled, so no path leaves the file behind.
struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                let path = self.path.display().to_string();
                let reason = e.to_string();
                warn!("Could not remove temporary file {path}: {reason}", path: path, reason: reason);
            }
        }
    }
}

/// Scratch space owned by one run
struct SyncRun {
    scratch: TempDir,
}

impl SyncRun {
    fn begin(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("catsync-");
        let scratch = match parent {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(SyncError::Scratch)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
        .map_err(SyncError::Scratch)?;

        Ok(Self { scratch })
    }

    fn artifact(&self, entry: &ManifestEntry) -> TempArtifact {
        TempArtifact {
            path: self.scratch.path().join(&entry.filename),
        }
    }
}

struct FileOutcome {
    records_written: usize,
    records_dropped: usize,
    bytes: u64,
}

/// Applies unabsorbed delta files to the store
pub struct DeltaApplier {
    feed: Arc<dyn FeedClient>,
    sink: Arc<dyn StorageSink>,
    manifest: ManifestFetcher,
    transform: RecordTransform,
    scratch_dir: Option<PathBuf>,
}

impl DeltaApplier {
    pub fn new(
        feed: Arc<dyn FeedClient>,
        sink: Arc<dyn StorageSink>,
        manifest: ManifestFetcher,
        transform: RecordTransform,
    ) -> Self {
        Self {
            feed,
            sink,
            manifest,
            transform,
            scratch_dir: None,
        }
    }

    /// Build from configuration
    pub fn from_config(
        config: &CatalogConfig,
        feed: Arc<dyn FeedClient>,
        sink: Arc<dyn StorageSink>,
    ) -> Result<Self> {
        let manifest = ManifestFetcher::new(&config.feed.manifest_url, config.sync.timestamp_token)?;
        let transform = RecordTransform::new(&config.sync.key_field, &config.sync.timestamp_field);
        Ok(Self::new(feed, sink, manifest, transform)
            .with_scratch_dir(config.sync.scratch_dir.clone()))
    }

    /// Put per-run scratch directories under `dir` instead of the system temp dir
    pub fn with_scratch_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.scratch_dir = dir;
        self
    }

    /// Run one synchronization pass.
    pub async fn apply(&self) -> Result<SyncReport> {
        let timestamp_field = self.transform.timestamp_field();
        let watermark = resolve_watermark(self.sink.as_ref(), timestamp_field).await?;
        let manifest_url = self.manifest.url();
        info!("Starting delta sync from {manifest_url} at watermark {watermark}", manifest_url: manifest_url, watermark: watermark);

        let mut report = SyncReport {
            watermark_before: watermark,
            watermark_after: watermark,
            ..Default::default()
        };

        let mut entries = match self.manifest.fetch(self.feed.as_ref()).await {
            Ok(entries) => entries,
            Err(SyncError::EmptyManifest { url }) => {
                info!("Manifest at {url} is empty, nothing to apply", url: url);
                return Ok(report);
            }
            Err(e) => {
                let reason = e.to_string();
                error!("Delta sync failed fetching manifest: {reason}", reason: reason);
                return Err(e);
            }
        };
        report.files_listed = entries.len();

        // The feed lists oldest first
        entries.reverse();

        let run = SyncRun::begin(self.scratch_dir.as_deref())?;

        for entry in &entries {
            let filename = entry.filename.as_str();
            let timestamp = entry.timestamp;

            // Every entry is checked; the listing is not guaranteed gap-free
            if timestamp <= watermark {
                debug!("Skipping {filename}: timestamp {timestamp} is at or below watermark {watermark}", filename: filename, timestamp: timestamp, watermark: watermark);
                report.files_skipped += 1;
                continue;
            }

            match self.apply_entry(&run, entry).await {
                Ok(outcome) => {
                    let records = outcome.records_written;
                    let bytes = outcome.bytes;
                    info!("Applied delta {filename} (timestamp {timestamp}, {records} records, {bytes} bytes)", filename: filename, timestamp: timestamp, records: records, bytes: bytes);

                    report.files_applied += 1;
                    report.records_written += outcome.records_written;
                    report.records_dropped += outcome.records_dropped;
                    report.bytes_downloaded += outcome.bytes;
                }
                Err(e) => {
                    let reason = e.to_string();
                    let applied = report.files_applied;
                    error!("Delta sync stopped at {filename} (timestamp {timestamp}) after {applied} files: {reason}", filename: filename, timestamp: timestamp, applied: applied, reason: reason);
                    return Err(e);
                }
            }
        }

        if report.files_applied > 0 {
            report.watermark_after = resolve_watermark(self.sink.as_ref(), timestamp_field).await?;
        }

        let applied = report.files_applied;
        let skipped = report.files_skipped;
        let watermark_after = report.watermark_after;
        info!("Delta sync complete: {applied} applied, {skipped} skipped, watermark {watermark_after}", applied: applied, skipped: skipped, watermark_after: watermark_after);
        Ok(report)
    }

    async fn apply_entry(&self, run: &SyncRun, entry: &ManifestEntry) -> Result<FileOutcome> {
        let artifact = run.artifact(entry);

        let bytes = self
            .feed
            .download(&entry.url, artifact.path())
            .await
            .map_err(|source| SyncError::DownloadFailed {
                filename: entry.filename.clone(),
                timestamp: entry.timestamp,
                source,
            })?;

        let batch = self
            .transform
            .read_file(artifact.path())
            .await
            .map_err(|source| SyncError::ParseFailed {
                source_name: entry.filename.clone(),
                source,
            })?;

        let records = batch.records.len();
        let dropped = batch.dropped;
        if dropped > 0 {
            let filename = entry.filename.as_str();
            warn!("Dropped {dropped} records without a key from {filename}", dropped: dropped, filename: filename);
        }

        let written = self
            .sink
            .upsert_batch(batch.records)
            .await
            .map_err(|source| SyncError::StorageWriteFailed {
                source_name: entry.filename.clone(),
                records,
                source,
            })?;

        drop(artifact);

        Ok(FileOutcome {
            records_written: written,
            records_dropped: dropped,
            bytes,
        })
    }
}

#[async_trait]
impl SyncJob for DeltaApplier {
    async fn run(&self) -> Result<SyncReport> {
        self.apply().await
    }
}
