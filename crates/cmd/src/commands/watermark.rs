// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::common::CatalogContext;
use anyhow::{Context, Result};
use chrono::DateTime;

/// Print the newest record timestamp in the store
pub async fn watermark_command(ctx: &CatalogContext) -> Result<i64> {
    let config = ctx.load_config()?;
    let sink = ctx.open_store(&config)?;

    let watermark = catalog::resolve_watermark(&*sink, &config.sync.timestamp_field)
        .await
        .context("Failed to read watermark")?;

    match DateTime::from_timestamp(watermark, 0) {
        Some(when) if watermark > 0 => println!("{watermark} ({})", when.to_rfc3339()),
        _ => println!("{watermark} (empty catalog)"),
    }
    Ok(watermark)
}
