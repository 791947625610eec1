// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;

/// One product record as stored in the catalog.
///
/// `payload` is the feed's JSON line kept verbatim. `source_ts` is copied out
/// of the payload at transform time so stores can index it; it is `None` when
/// the record carries no usable timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    pub key: String,
    pub payload: String,
    pub source_ts: Option<i64>,
}

impl CatalogRecord {
    pub fn new(key: impl Into<String>, payload: impl Into<String>, source_ts: Option<i64>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
            source_ts,
        }
    }
}

/// A delta file listed by the feed manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub filename: String,
    /// Timestamp embedded in the filename
    pub timestamp: i64,
    /// Where the file is downloaded from
    pub url: String,
}

/// What one delta sync run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub watermark_before: i64,
    pub watermark_after: i64,
    pub files_listed: usize,
    pub files_skipped: usize,
    pub files_applied: usize,
    pub records_written: usize,
    pub records_dropped: usize,
    pub bytes_downloaded: u64,
}

/// What one snapshot load did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub records_written: usize,
    pub records_dropped: usize,
    pub chunks_written: usize,
}
