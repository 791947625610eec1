// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::common::CatalogContext;
use anyhow::Result;
use catalog::{SyncJob, SyncTrigger};
use diagnostics::*;
use std::sync::Arc;

/// Run the daily delta sync until interrupted
pub async fn schedule_command(ctx: &CatalogContext) -> Result<()> {
    let config = ctx.load_config()?;
    let at = config.sync.daily_time()?;
    let job: Arc<dyn SyncJob> = Arc::new(ctx.delta_applier(&config)?);
    let trigger = SyncTrigger::new(job);

    println!(
        "✓ Delta sync scheduled daily at {} (Ctrl-C to stop)",
        at.format("%H:%M")
    );

    trigger
        .run_daily(at, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                let reason = e.to_string();
                error!("Cannot listen for Ctrl-C, running until killed: {reason}", reason: reason);
                std::future::pending::<()>().await;
            }
        })
        .await;

    println!("Stopped");
    Ok(())
}
