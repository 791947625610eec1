// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Result, SyncError};
use crate::sink::StorageSink;
use diagnostics::*;

/// Highest source timestamp already in the store, 0 for an empty store.
///
/// The stored data is the checkpoint: nothing else records how far the
/// feed has been applied.
pub async fn resolve_watermark(sink: &dyn StorageSink, timestamp_field: &str) -> Result<i64> {
    let watermark = sink
        .max_field(timestamp_field)
        .await
        .map_err(SyncError::StorageReadFailed)?;
    debug!("Resolved watermark {watermark} from {timestamp_field}", watermark: watermark, timestamp_field: timestamp_field);
    Ok(watermark)
}
