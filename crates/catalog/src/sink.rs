// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Storage sink capability.
//!
//! The engine never talks to a database driver directly. Everything it needs
//! from durable storage is an atomic keyed upsert and a max aggregate over a
//! timestamp embedded in the stored payloads.

use crate::error::SinkError;
use crate::models::CatalogRecord;
use crate::transform::extract_timestamp;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Insert or replace every record in one atomic write.
    ///
    /// Either the whole batch becomes visible or none of it does. A key
    /// repeated within the batch resolves to its last occurrence. A stored
    /// record is not replaced by one carrying an older timestamp.
    ///
    /// Returns the number of rows inserted or replaced.
    async fn upsert_batch(&self, records: Vec<CatalogRecord>) -> Result<usize, SinkError>;

    /// Maximum integer value of `field` across stored payloads, 0 when no
    /// record carries it.
    async fn max_field(&self, field: &str) -> Result<i64, SinkError>;

    /// Start a load whose writes become visible together on commit.
    async fn begin_load(&self) -> Result<Box<dyn LoadTransaction>, SinkError>;
}

/// A multi-batch write that is applied all at once or not at all.
///
/// Dropping it without calling `commit` discards every write.
#[async_trait]
pub trait LoadTransaction: Send {
    /// Stage one batch with `upsert_batch` semantics, returning the rows it
    /// inserts or replaces.
    async fn write(&mut self, records: Vec<CatalogRecord>) -> Result<usize, SinkError>;

    /// Make every staged write visible.
    async fn commit(self: Box<Self>) -> Result<(), SinkError>;
}

/// Collapse repeated keys, keeping the last occurrence in feed order.
pub fn dedupe_last_wins(records: Vec<CatalogRecord>) -> Vec<CatalogRecord> {
    let mut position: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut out: Vec<CatalogRecord> = Vec::with_capacity(records.len());

    for record in records {
        match position.get(&record.key) {
            Some(&idx) => out[idx] = record,
            None => {
                position.insert(record.key.clone(), out.len());
                out.push(record);
            }
        }
    }
    out
}

/// Whether an incoming record may overwrite what is stored.
///
/// Only a pair of known timestamps can veto a write.
pub fn should_replace(stored_ts: Option<i64>, incoming_ts: Option<i64>) -> bool {
    match (stored_ts, incoming_ts) {
        (Some(stored), Some(incoming)) => incoming >= stored,
        _ => true,
    }
}

/// In-process sink backed by a `BTreeMap`.
///
/// Used by tests and dry runs; it has no durability.
type RecordMap = BTreeMap<String, CatalogRecord>;

#[derive(Default)]
pub struct MemorySink {
    records: Arc<Mutex<RecordMap>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RecordMap>, SinkError> {
        lock_records(&self.records)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<CatalogRecord> {
        self.lock().ok().and_then(|r| r.get(key).cloned())
    }

    /// Copy of the key → payload mapping
    pub fn contents(&self) -> BTreeMap<String, String> {
        self.lock()
            .map(|r| {
                r.iter()
                    .map(|(k, v)| (k.clone(), v.payload.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl StorageSink for MemorySink {
    async fn upsert_batch(&self, records: Vec<CatalogRecord>) -> Result<usize, SinkError> {
        let batch = dedupe_last_wins(records);
        let mut stored = self.lock()?;

        let mut written = 0;
        for record in batch {
            let current = stored.get(&record.key).and_then(|r| r.source_ts);
            if stored.contains_key(&record.key) && !should_replace(current, record.source_ts) {
                continue;
            }
            stored.insert(record.key.clone(), record);
            written += 1;
        }
        Ok(written)
    }

    async fn max_field(&self, field: &str) -> Result<i64, SinkError> {
        let stored = self.lock()?;
        let max = stored
            .values()
            .filter_map(|r| serde_json::from_str::<serde_json::Value>(&r.payload).ok())
            .filter_map(|v| extract_timestamp(&v, field))
            .max();
        Ok(max.unwrap_or(0))
    }

    async fn begin_load(&self) -> Result<Box<dyn LoadTransaction>, SinkError> {
        Ok(Box::new(MemoryLoad {
            records: self.records.clone(),
            staged: RecordMap::new(),
        }))
    }
}

fn lock_records(records: &Mutex<RecordMap>) -> Result<MutexGuard<'_, RecordMap>, SinkError> {
    records
        .lock()
        .map_err(|_| SinkError::Unavailable("memory sink lock poisoned".to_string()))
}

/// Writes staged on top of the stored map until commit
struct MemoryLoad {
    records: Arc<Mutex<RecordMap>>,
    staged: RecordMap,
}

#[async_trait]
impl LoadTransaction for MemoryLoad {
    async fn write(&mut self, records: Vec<CatalogRecord>) -> Result<usize, SinkError> {
        let stored = lock_records(&self.records)?;

        let mut written = 0;
        for record in dedupe_last_wins(records) {
            let current_ts = self
                .staged
                .get(&record.key)
                .or_else(|| stored.get(&record.key))
                .map(|r| r.source_ts);
            if current_ts.is_some_and(|ts| !should_replace(ts, record.source_ts)) {
                continue;
            }
            self.staged.insert(record.key.clone(), record);
            written += 1;
        }
        Ok(written)
    }

    async fn commit(self: Box<Self>) -> Result<(), SinkError> {
        let MemoryLoad { records, staged } = *self;
        lock_records(&records)?.extend(staged);
        Ok(())
    }
}
