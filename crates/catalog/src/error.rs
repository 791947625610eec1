// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

// Error types for catalog synchronization
use std::path::PathBuf;

/// Failure reported by a [`crate::sink::StorageSink`].
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("Field {field} is not indexed by this store (indexed: {indexed})")]
    UnindexedField { field: String, indexed: String },

    #[error("Record {key} rejected: {reason}")]
    Rejected { key: String, reason: String },

    #[error("Storage engine unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by a [`crate::feed::FeedClient`].
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Failed writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a file (or snapshot) could not be turned into records.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Failed to decompress or read: {0}")]
    Read(#[from] std::io::Error),

    #[error("Line {line} is not valid JSON: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level failure of a sync run or a bulk load.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Feed unavailable at {url}: {source}")]
    FeedUnavailable {
        url: String,
        #[source]
        source: FeedError,
    },

    #[error("Manifest at {url} is empty")]
    EmptyManifest { url: String },

    #[error("Download of {filename} (timestamp {timestamp}) failed: {source}")]
    DownloadFailed {
        filename: String,
        timestamp: i64,
        #[source]
        source: FeedError,
    },

    #[error("Could not parse {source_name}: {source}")]
    ParseFailed {
        source_name: String,
        #[source]
        source: ParseError,
    },

    #[error("Writing {records} records from {source_name} failed: {source}")]
    StorageWriteFailed {
        source_name: String,
        records: usize,
        #[source]
        source: SinkError,
    },

    #[error("Reading the watermark failed: {0}")]
    StorageReadFailed(#[source] SinkError),

    #[error("Cannot open snapshot {path}: {source}")]
    SnapshotUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create scratch space: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
