// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Daily trigger for delta sync with a single-flight guard.

use crate::delta::SyncJob;
use crate::error::Result;
use crate::models::SyncReport;
use chrono::{Days, Local, NaiveDateTime, NaiveTime};
use diagnostics::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// What happened when the trigger fired
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Completed(SyncReport),
    /// Another run was still in progress
    Suppressed,
}

/// Next occurrence of `at` strictly after `now`.
pub fn next_fire_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today.checked_add_days(Days::new(1)).unwrap_or(today)
    }
}

pub struct SyncTrigger {
    job: Arc<dyn SyncJob>,
    in_flight: Mutex<()>,
}

impl SyncTrigger {
    pub fn new(job: Arc<dyn SyncJob>) -> Self {
        Self {
            job,
            in_flight: Mutex::new(()),
        }
    }

    /// Run the job now unless a run is already in progress.
    pub async fn fire(&self) -> Result<TriggerOutcome> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("Delta sync already running, suppressing this trigger");
            return Ok(TriggerOutcome::Suppressed);
        };

        let report = self.job.run().await?;
        Ok(TriggerOutcome::Completed(report))
    }

    /// Fire once a day at `at` server-local time until `shutdown` resolves.
    ///
    /// Failed runs are logged and left for the next day's run.
    pub async fn run_daily<F>(&self, at: NaiveTime, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let now = Local::now().naive_local();
            let next = next_fire_after(now, at);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            let next_run = next.format("%Y-%m-%d %H:%M").to_string();
            info!("Next delta sync scheduled for {next_run}", next_run: next_run);

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Sync trigger shutting down");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            match self.fire().await {
                Ok(TriggerOutcome::Completed(report)) => {
                    let applied = report.files_applied;
                    debug!("Scheduled delta sync applied {applied} files", applied: applied);
                }
                Ok(TriggerOutcome::Suppressed) => {}
                Err(e) => {
                    let reason = e.to_string();
                    error!("Scheduled delta sync failed, retrying at the next scheduled time: {reason}", reason: reason);
                }
            }
        }
    }
}
