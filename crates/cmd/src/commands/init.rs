// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::common::CatalogContext;
use anyhow::{Context, Result, bail};

/// Write a starter configuration file, refusing to overwrite one
pub fn init_command(ctx: &CatalogContext) -> Result<()> {
    let path = &ctx.config_path;
    if path.exists() {
        bail!("Configuration already exists at {}", path.display());
    }

    catalog::create_example_config(path)
        .with_context(|| format!("Failed to initialize {}", path.display()))?;

    println!("✓ Wrote example configuration to {}", path.display());
    println!("  Edit store.path, then run `catsync import-products <snapshot>`");
    Ok(())
}
