// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! DuckDB-backed storage sink.
//!
//! One table holds the catalog. The configured timestamp field is copied
//! into its own column on write so the watermark query is a plain column
//! aggregate instead of a JSON scan.

use crate::error::SinkError;
use crate::models::CatalogRecord;
use crate::sink::{LoadTransaction, StorageSink, dedupe_last_wins};
use async_trait::async_trait;
use diagnostics::*;
use duckdb::{Connection, params};
use std::path::Path;
use std::sync::{Arc, Mutex};

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS catalog_records (
        record_key TEXT PRIMARY KEY,
        payload    TEXT NOT NULL,
        source_ts  BIGINT
    )";

// Older timestamps never overwrite newer ones
const UPSERT: &str = "
    INSERT INTO catalog_records (record_key, payload, source_ts) VALUES (?, ?, ?)
    ON CONFLICT (record_key) DO UPDATE
        SET payload = excluded.payload, source_ts = excluded.source_ts
        WHERE excluded.source_ts IS NULL
           OR catalog_records.source_ts IS NULL
           OR excluded.source_ts >= catalog_records.source_ts";

const MAX_SOURCE_TS: &str = "SELECT COALESCE(MAX(source_ts), 0) FROM catalog_records";

const COUNT: &str = "SELECT COUNT(*) FROM catalog_records";

const GET: &str = "SELECT payload, source_ts FROM catalog_records WHERE record_key = ?";

pub struct DuckDbSink {
    conn: Arc<Mutex<Connection>>,
    timestamp_field: String,
}

impl DuckDbSink {
    /// Open (or create) the catalog database at `path`.
    pub fn open<P: AsRef<Path>>(path: P, timestamp_field: &str) -> Result<Self, SinkError> {
        let display = path.as_ref().display().to_string();
        debug!("Opening catalog store at {display}", display: display);
        let conn = Connection::open(path)?;
        Self::from_connection(conn, timestamp_field)
    }

    /// Throwaway in-memory catalog.
    pub fn open_in_memory(timestamp_field: &str) -> Result<Self, SinkError> {
        Self::from_connection(Connection::open_in_memory()?, timestamp_field)
    }

    /// Wrap an existing connection, creating the table if it is missing.
    pub fn from_connection(conn: Connection, timestamp_field: &str) -> Result<Self, SinkError> {
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            timestamp_field: timestamp_field.to_string(),
        })
    }

    /// Run blocking DuckDB work off the async executor.
    async fn with_conn<T, F>(&self, work: F) -> Result<T, SinkError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, SinkError> + Send + 'static,
    {
        run_blocking(self.conn.clone(), work).await
    }

    /// Number of stored records
    pub async fn count(&self) -> Result<usize, SinkError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(COUNT, [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or_default())
        })
        .await
    }

    /// Stored record for `key`, if any
    pub async fn get(&self, key: &str) -> Result<Option<CatalogRecord>, SinkError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(GET)?;
            let mut rows = stmt.query(params![key])?;
            match rows.next()? {
                Some(row) => Ok(Some(CatalogRecord {
                    key: key.clone(),
                    payload: row.get(0)?,
                    source_ts: row.get(1)?,
                })),
                None => Ok(None),
            }
        })
        .await
    }
}

async fn run_blocking<T, F>(conn: Arc<Mutex<Connection>>, work: F) -> Result<T, SinkError>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, SinkError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn
            .lock()
            .map_err(|_| SinkError::Unavailable("catalog connection lock poisoned".to_string()))?;
        work(&mut guard)
    })
    .await
    .map_err(|e| SinkError::Unavailable(format!("storage task failed: {e}")))?
}

fn upsert_rows(conn: &Connection, batch: &[CatalogRecord]) -> Result<usize, SinkError> {
    let mut stmt = conn.prepare(UPSERT)?;
    let mut written = 0;
    for record in batch {
        written += stmt
            .execute(params![record.key, record.payload, record.source_ts])
            .map_err(|e| SinkError::Rejected {
                key: record.key.clone(),
                reason: e.to_string(),
            })?;
    }
    Ok(written)
}

fn write_batch(conn: &mut Connection, batch: &[CatalogRecord]) -> Result<usize, SinkError> {
    // Dropping the transaction on any error path rolls it back
    let tx = conn.transaction()?;
    let written = upsert_rows(&tx, batch)?;
    tx.commit()?;
    Ok(written)
}

/// A load running in its own transaction on a dedicated connection.
///
/// Other writers keep using the sink's main connection and never see the
/// load's rows before commit. Closing the connection without `COMMIT` rolls
/// the transaction back, so dropping the load discards it.
struct DuckDbLoad {
    conn: Arc<Mutex<Connection>>,
}

#[async_trait]
impl LoadTransaction for DuckDbLoad {
    async fn write(&mut self, records: Vec<CatalogRecord>) -> Result<usize, SinkError> {
        let batch = dedupe_last_wins(records);
        if batch.is_empty() {
            return Ok(0);
        }
        run_blocking(self.conn.clone(), move |conn| upsert_rows(conn, &batch)).await
    }

    async fn commit(self: Box<Self>) -> Result<(), SinkError> {
        run_blocking(self.conn.clone(), |conn| Ok(conn.execute_batch("COMMIT")?)).await
    }
}

#[async_trait]
impl StorageSink for DuckDbSink {
    async fn upsert_batch(&self, records: Vec<CatalogRecord>) -> Result<usize, SinkError> {
        let batch = dedupe_last_wins(records);
        if batch.is_empty() {
            return Ok(0);
        }

        let rows = batch.len();
        let written = self.with_conn(move |conn| write_batch(conn, &batch)).await?;
        debug!("Upserted {written} of {rows} records", written: written, rows: rows);
        Ok(written)
    }

    async fn max_field(&self, field: &str) -> Result<i64, SinkError> {
        if field != self.timestamp_field {
            return Err(SinkError::UnindexedField {
                field: field.to_string(),
                indexed: self.timestamp_field.clone(),
            });
        }

        self.with_conn(|conn| Ok(conn.query_row(MAX_SOURCE_TS, [], |row| row.get::<_, i64>(0))?))
            .await
    }

    async fn begin_load(&self) -> Result<Box<dyn LoadTransaction>, SinkError> {
        let conn = self
            .with_conn(|conn| {
                let load = conn.try_clone()?;
                load.execute_batch("BEGIN TRANSACTION")?;
                Ok(load)
            })
            .await?;
        debug!("Started load transaction");
        Ok(Box::new(DuckDbLoad {
            conn: Arc::new(Mutex::new(conn)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(key: &str, ts: Option<i64>) -> CatalogRecord {
        let payload = match ts {
            Some(ts) => format!(r#"{{"code":"{key}","last_modified_t":{ts}}}"#),
            None => format!(r#"{{"code":"{key}"}}"#),
        };
        CatalogRecord::new(key, payload, ts)
    }

    fn sink() -> DuckDbSink {
        DuckDbSink::open_in_memory("last_modified_t").unwrap()
    }

    #[tokio::test]
    async fn test_empty_store_watermark_is_zero() {
        let sink = sink();
        assert_eq!(sink.max_field("last_modified_t").await.unwrap(), 0);
        assert_eq!(sink.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_inserts_and_replaces() {
        let sink = sink();
        sink.upsert_batch(vec![rec("a", Some(10)), rec("b", Some(20))])
            .await
            .unwrap();
        assert_eq!(sink.count().await.unwrap(), 2);

        sink.upsert_batch(vec![rec("a", Some(30))]).await.unwrap();
        assert_eq!(sink.count().await.unwrap(), 2);

        let a = sink.get("a").await.unwrap().unwrap();
        assert_eq!(a.source_ts, Some(30));
        assert_eq!(a.payload, r#"{"code":"a","last_modified_t":30}"#);
        assert_eq!(sink.max_field("last_modified_t").await.unwrap(), 30);
    }

    #[tokio::test]
    async fn test_duplicate_keys_in_one_batch() {
        let sink = sink();
        sink.upsert_batch(vec![rec("a", Some(1)), rec("a", Some(2))])
            .await
            .unwrap();

        assert_eq!(sink.count().await.unwrap(), 1);
        assert_eq!(sink.get("a").await.unwrap().unwrap().source_ts, Some(2));
    }

    #[tokio::test]
    async fn test_older_record_does_not_regress() {
        let sink = sink();
        sink.upsert_batch(vec![rec("a", Some(200))]).await.unwrap();

        sink.upsert_batch(vec![rec("a", Some(100))]).await.unwrap();
        assert_eq!(sink.get("a").await.unwrap().unwrap().source_ts, Some(200));
    }

    #[tokio::test]
    async fn test_max_skips_missing_timestamps() {
        let sink = sink();
        sink.upsert_batch(vec![rec("a", None), rec("b", Some(7)), rec("c", None)])
            .await
            .unwrap();

        assert_eq!(sink.max_field("last_modified_t").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_unindexed_field_is_an_error() {
        let sink = sink();
        assert!(matches!(
            sink.max_field("created_t").await,
            Err(SinkError::UnindexedField { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE catalog_records (
                record_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                source_ts BIGINT,
                CHECK (record_key <> 'poison')
            )",
        )
        .unwrap();
        let sink = DuckDbSink::from_connection(conn, "last_modified_t").unwrap();

        let result = sink
            .upsert_batch(vec![rec("a", Some(1)), rec("poison", Some(2)), rec("c", Some(3))])
            .await;

        assert!(matches!(result, Err(SinkError::Rejected { ref key, .. }) if key == "poison"));
        assert_eq!(sink.count().await.unwrap(), 0);
        assert_eq!(sink.max_field("last_modified_t").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_load_commits_all_chunks_together() {
        let sink = sink();
        sink.upsert_batch(vec![rec("a", Some(50))]).await.unwrap();

        let mut load = sink.begin_load().await.unwrap();
        load.write(vec![rec("b", Some(1)), rec("c", Some(2))]).await.unwrap();
        load.write(vec![rec("d", Some(3)), rec("a", Some(10))]).await.unwrap();
        assert_eq!(sink.count().await.unwrap(), 1);

        load.commit().await.unwrap();
        assert_eq!(sink.count().await.unwrap(), 4);
        // the older snapshot row did not replace the newer one
        assert_eq!(sink.get("a").await.unwrap().unwrap().source_ts, Some(50));
    }

    #[tokio::test]
    async fn test_dropped_load_is_discarded() {
        let sink = sink();
        {
            let mut load = sink.begin_load().await.unwrap();
            load.write(vec![rec("a", Some(1))]).await.unwrap();
        }

        assert_eq!(sink.count().await.unwrap(), 0);
        // the sink keeps working after the abandoned load
        sink.upsert_batch(vec![rec("b", Some(2))]).await.unwrap();
        assert_eq!(sink.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reopen_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.duckdb");

        {
            let sink = DuckDbSink::open(&path, "last_modified_t").unwrap();
            sink.upsert_batch(vec![rec("a", Some(5))]).await.unwrap();
        }

        let sink = DuckDbSink::open(&path, "last_modified_t").unwrap();
        assert_eq!(sink.count().await.unwrap(), 1);
        assert_eq!(sink.max_field("last_modified_t").await.unwrap(), 5);
    }
}
