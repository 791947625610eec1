// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::common::CatalogContext;
use anyhow::{Context, Result};
use catalog::SyncReport;

/// Run one delta synchronization pass now
pub async fn sync_command(ctx: &CatalogContext) -> Result<SyncReport> {
    let config = ctx.load_config()?;
    let applier = ctx.delta_applier(&config)?;

    let report = applier.apply().await.context("Delta sync failed")?;

    println!("✓ Delta sync complete");
    println!(
        "  Watermark: {} -> {}",
        report.watermark_before, report.watermark_after
    );
    println!(
        "  Files: {} listed, {} skipped, {} applied",
        report.files_listed, report.files_skipped, report.files_applied
    );
    println!(
        "  Records: {} written, {} dropped ({} bytes downloaded)",
        report.records_written, report.records_dropped, report.bytes_downloaded
    );
    Ok(report)
}
