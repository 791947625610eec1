// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use catalog::{
    BulkLoader, CatalogRecord, DuckDbSink, MemorySink, RecordTransform, StorageSink, SyncError,
};
use std::sync::Arc;
use tempfile::tempdir;

use fake_feed::{FailingSink, gzip_lines, product};

fn loader(sink: Arc<dyn StorageSink>, chunk_size: usize) -> BulkLoader {
    BulkLoader::new(sink, RecordTransform::new("code", "last_modified_t"), chunk_size)
}

#[tokio::test]
async fn test_snapshot_loads_in_chunks() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("openfoodfacts-products.jsonl.gz");
    let lines: Vec<String> = (0..25).map(|i| product(&format!("{i:05}"), 1000 + i)).collect();
    std::fs::write(&path, gzip_lines(&lines))?;

    let sink = Arc::new(DuckDbSink::open(dir.path().join("catalog.duckdb"), "last_modified_t")?);
    let report = loader(sink.clone(), 10).load_path(&path).await?;

    assert_eq!(report.records_written, 25);
    assert_eq!(report.chunks_written, 3);
    assert_eq!(report.records_dropped, 0);
    assert_eq!(sink.count().await?, 25);
    assert_eq!(sink.max_field("last_modified_t").await?, 1024);
    Ok(())
}

#[tokio::test]
async fn test_exact_multiple_of_chunk_size() -> Result<()> {
    let lines: Vec<String> = (0..20).map(|i| product(&i.to_string(), i)).collect();
    let body = gzip_lines(&lines);
    let sink = Arc::new(MemorySink::new());

    let report = loader(sink.clone(), 10).load_reader(&body[..], "snapshot").await?;

    assert_eq!(report.chunks_written, 2);
    assert_eq!(sink.len(), 20);
    Ok(())
}

#[tokio::test]
async fn test_reimport_is_idempotent() -> Result<()> {
    let lines = vec![product("a", 1), product("b", 2), product("a", 3)];
    let body = gzip_lines(&lines);
    let sink = Arc::new(MemorySink::new());
    let loader = loader(sink.clone(), 1000);

    loader.load_reader(&body[..], "snapshot").await?;
    let first = sink.contents();
    loader.load_reader(&body[..], "snapshot").await?;

    assert_eq!(sink.contents(), first);
    assert_eq!(sink.len(), 2);
    assert_eq!(sink.get("a").map(|r| r.source_ts), Some(Some(3)));
    Ok(())
}

#[tokio::test]
async fn test_keyless_records_are_counted() -> Result<()> {
    let body = gzip_lines(&[
        product("a", 1),
        r#"{"product_name":"no barcode"}"#.to_string(),
        r#"{"code":12345,"product_name":"numeric barcode"}"#.to_string(),
    ]);
    let sink = Arc::new(MemorySink::new());

    let report = loader(sink.clone(), 10).load_reader(&body[..], "snapshot").await?;

    assert_eq!(report.records_written, 2);
    assert_eq!(report.records_dropped, 1);
    assert!(sink.get("12345").is_some());
    Ok(())
}

#[tokio::test]
async fn test_missing_snapshot() -> Result<()> {
    let dir = tempdir()?;
    let result = loader(Arc::new(MemorySink::new()), 10)
        .load_path(&dir.path().join("nope.jsonl.gz"))
        .await;

    assert!(matches!(result, Err(SyncError::SnapshotUnreadable { .. })));
    Ok(())
}

#[tokio::test]
async fn test_corrupt_snapshot() -> Result<()> {
    let body = b"\x1f\x8b definitely not a real gzip stream".to_vec();
    let sink = Arc::new(MemorySink::new());

    let result = loader(sink.clone(), 10).load_reader(&body[..], "corrupt").await;

    assert!(matches!(result, Err(SyncError::ParseFailed { .. })));
    assert!(sink.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_write_failure_surfaces() -> Result<()> {
    let body = gzip_lines(&[product("a", 1)]);

    let result = loader(Arc::new(FailingSink), 10)
        .load_reader(&body[..], "snapshot")
        .await;

    assert!(matches!(result, Err(SyncError::StorageWriteFailed { .. })));
    Ok(())
}

#[tokio::test]
async fn test_parse_failure_after_first_chunk_loads_nothing() -> Result<()> {
    let body = gzip_lines(&[
        product("a", 1),
        product("b", 2),
        product("c", 3),
        "{bad".to_string(),
    ]);
    let sink = Arc::new(MemorySink::new());

    let result = loader(sink.clone(), 2).load_reader(&body[..], "snapshot").await;

    assert!(matches!(result, Err(SyncError::ParseFailed { .. })));
    assert!(sink.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_duckdb_failed_load_rolls_back_every_chunk() -> Result<()> {
    let conn = duckdb::Connection::open_in_memory()?;
    conn.execute_batch(
        "CREATE TABLE catalog_records (
            record_key TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            source_ts BIGINT,
            CHECK (record_key <> 'poison')
        )",
    )?;
    let sink = Arc::new(DuckDbSink::from_connection(conn, "last_modified_t")?);
    sink.upsert_batch(vec![CatalogRecord::new("old", product("old", 7), Some(7))])
        .await?;

    let body = gzip_lines(&[
        product("a", 10),
        product("b", 11),
        product("c", 12),
        product("poison", 13),
        product("d", 14),
    ]);
    let result = loader(sink.clone(), 2).load_reader(&body[..], "snapshot").await;

    assert!(matches!(result, Err(SyncError::StorageWriteFailed { .. })));
    assert_eq!(sink.count().await?, 1);
    assert!(sink.get("a").await?.is_none());
    assert_eq!(sink.max_field("last_modified_t").await?, 7);
    Ok(())
}

#[tokio::test]
async fn test_duckdb_parse_failure_rolls_back() -> Result<()> {
    let sink = Arc::new(DuckDbSink::open_in_memory("last_modified_t")?);
    let body = gzip_lines(&[
        product("a", 1),
        product("b", 2),
        product("c", 3),
        "{bad".to_string(),
    ]);

    let result = loader(sink.clone(), 2).load_reader(&body[..], "snapshot").await;

    assert!(matches!(result, Err(SyncError::ParseFailed { .. })));
    assert_eq!(sink.count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_huge_chunk_size_is_accepted() -> Result<()> {
    let body = gzip_lines(&[product("a", 1), product("b", 2)]);
    let sink = Arc::new(MemorySink::new());

    let report = loader(sink.clone(), usize::MAX)
        .load_reader(&body[..], "snapshot")
        .await?;

    assert_eq!(report.records_written, 2);
    assert_eq!(report.chunks_written, 1);
    assert_eq!(sink.len(), 2);
    Ok(())
}
