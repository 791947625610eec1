// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! One-shot snapshot import.
//!
//! Streams a full gzip dump straight into the store without looking at the
//! watermark. The dump is never held in memory: records are written in
//! chunks, but all chunks belong to one load transaction that commits at the
//! end of the stream. A failed import leaves the store untouched.

use crate::error::{Result, SinkError, SyncError};
use crate::models::{CatalogRecord, LoadReport};
use crate::sink::{LoadTransaction, StorageSink};
use crate::transform::RecordTransform;
use diagnostics::*;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Upper bound on the records reserved up front for one chunk
const MAX_CHUNK_RESERVE: usize = 8192;

pub struct BulkLoader {
    sink: Arc<dyn StorageSink>,
    transform: RecordTransform,
    chunk_size: usize,
}

impl BulkLoader {
    pub fn new(sink: Arc<dyn StorageSink>, transform: RecordTransform, chunk_size: usize) -> Self {
        Self {
            sink,
            transform,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Import the snapshot archive at `path`.
    pub async fn load_path(&self, path: &Path) -> Result<LoadReport> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| SyncError::SnapshotUnreadable {
                path: path.to_path_buf(),
                source,
            })?;

        let name = path.display().to_string();
        self.load_reader(file, &name).await
    }

    /// Import a gzip snapshot from any byte stream; `name` labels logs and errors.
    pub async fn load_reader<R>(&self, reader: R, name: &str) -> Result<LoadReport>
    where
        R: AsyncRead + Unpin + Send,
    {
        info!("Importing snapshot {name}", name: name);
        let write_failed = |records: usize| {
            move |source: SinkError| SyncError::StorageWriteFailed {
                source_name: name.to_string(),
                records,
                source,
            }
        };

        // Every early return below drops the load, discarding what it staged
        let mut load = self.sink.begin_load().await.map_err(write_failed(0))?;
        let mut stream = self.transform.records(reader);
        let mut report = LoadReport::default();
        let reserve = self.chunk_size.min(MAX_CHUNK_RESERVE);
        let mut chunk: Vec<CatalogRecord> = Vec::with_capacity(reserve);

        loop {
            let next = stream
                .next_record()
                .await
                .map_err(|source| SyncError::ParseFailed {
                    source_name: name.to_string(),
                    source,
                })?;

            let done = next.is_none();
            if let Some(record) = next {
                chunk.push(record);
            }

            if chunk.len() >= self.chunk_size || (done && !chunk.is_empty()) {
                let batch = std::mem::replace(&mut chunk, Vec::with_capacity(reserve));
                self.write_chunk(&mut load, batch, name, &mut report).await?;
            }

            if done {
                break;
            }
        }

        let staged = report.records_written;
        load.commit().await.map_err(write_failed(staged))?;

        report.records_dropped = stream.dropped();
        let written = report.records_written;
        let dropped = report.records_dropped;
        let chunks = report.chunks_written;
        info!(
            "Imported snapshot {name}: {written} records in {chunks} chunks, {dropped} dropped without a key",
            name: name,
            written: written,
            chunks: chunks,
            dropped: dropped
        );
        Ok(report)
    }

    async fn write_chunk(
        &self,
        load: &mut Box<dyn LoadTransaction>,
        batch: Vec<CatalogRecord>,
        name: &str,
        report: &mut LoadReport,
    ) -> Result<()> {
        let records = batch.len();
        let written = load.write(batch).await.map_err(|source| {
            let reason = source.to_string();
            let staged = report.records_written;
            error!(
                "Snapshot import of {name} failed after {staged} staged records, nothing was committed: {reason}",
                name: name,
                staged: staged,
                reason: reason
            );
            SyncError::StorageWriteFailed {
                source_name: name.to_string(),
                records,
                source,
            }
        })?;

        report.records_written += written;
        report.chunks_written += 1;
        let total = report.records_written;
        debug!(
            "Wrote chunk of {records} records from {name} ({total} so far)",
            records: records,
            name: name,
            total: total
        );
        Ok(())
    }
}
