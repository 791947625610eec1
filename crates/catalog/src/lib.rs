// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Catalog synchronization: keeps a local product catalog in step with a
//! remote feed of gzip-compressed JSON-lines files.
//!
//! - [`bulk::BulkLoader`] imports a full snapshot once.
//! - [`delta::DeltaApplier`] applies the delta files published since the
//!   newest record already stored.
//! - [`trigger::SyncTrigger`] runs the applier daily, one run at a time.

pub mod bulk;
pub mod checkpoint;
pub mod config;
pub mod delta;
pub mod error;
pub mod feed;
pub mod manifest;
pub mod models;
pub mod sink;
pub mod store;
pub mod transform;
pub mod trigger;

// Re-export key types for use in tests and external applications
pub use crate::bulk::BulkLoader;
pub use crate::checkpoint::resolve_watermark;
pub use crate::config::{CatalogConfig, create_example_config, load_config};
pub use crate::delta::{DeltaApplier, SyncJob};
pub use crate::error::{FeedError, ParseError, SinkError, SyncError};
pub use crate::feed::{FeedClient, HttpFeedClient};
pub use crate::manifest::ManifestFetcher;
pub use crate::models::{CatalogRecord, LoadReport, ManifestEntry, SyncReport};
pub use crate::sink::{LoadTransaction, MemorySink, StorageSink};
pub use crate::store::DuckDbSink;
pub use crate::transform::RecordTransform;
pub use crate::trigger::{SyncTrigger, TriggerOutcome};
