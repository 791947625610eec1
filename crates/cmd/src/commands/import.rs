// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::common::CatalogContext;
use anyhow::{Context, Result};
use catalog::{BulkLoader, LoadReport, RecordTransform};
use diagnostics::*;
use std::path::Path;

/// Load a full snapshot archive into the configured store
pub async fn import_products_command(ctx: &CatalogContext, snapshot: &Path) -> Result<LoadReport> {
    let config = ctx.load_config()?;
    let sink = ctx.open_store(&config)?;

    let transform = RecordTransform::new(&config.sync.key_field, &config.sync.timestamp_field);
    let loader = BulkLoader::new(sink, transform, config.bulk.chunk_size);

    let snapshot_name = snapshot.display().to_string();
    debug!("Starting bulk import of {snapshot_name}", snapshot_name: snapshot_name);

    let report = loader
        .load_path(snapshot)
        .await
        .with_context(|| format!("Failed to import {}", snapshot.display()))?;

    println!(
        "✓ Imported {} records from {} ({} dropped, {} chunks)",
        report.records_written,
        snapshot.display(),
        report.records_dropped,
        report.chunks_written
    );
    Ok(report)
}
