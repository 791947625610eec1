// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use catalog::{
    DeltaApplier, FeedClient, FeedError, HttpFeedClient, ManifestFetcher, MemorySink,
    RecordTransform, SyncError,
};
use std::sync::Arc;
use tempfile::tempdir;

use fake_feed::{gzip_lines, product};
use mock_feed::MockFeedServer;

fn http_applier(manifest_url: &str, sink: Arc<MemorySink>) -> Result<DeltaApplier> {
    let feed: Arc<dyn FeedClient> = Arc::new(HttpFeedClient::new(30)?);
    Ok(DeltaApplier::new(
        feed,
        sink,
        ManifestFetcher::new(manifest_url, 1)?,
        RecordTransform::new("code", "last_modified_t"),
    ))
}

#[tokio::test]
async fn test_sync_over_http() -> Result<()> {
    let mut server = MockFeedServer::new();
    server.add_file("index.txt", b"feed_100_a.gz\nfeed_200_a.gz\n".to_vec());
    server.add_file("feed_100_a.gz", gzip_lines(&[product("111", 100)]));
    server.add_file("feed_200_a.gz", gzip_lines(&[product("222", 200)]));
    let base_url = server.start().await;

    let sink = Arc::new(MemorySink::new());
    let applier = http_applier(&format!("{base_url}/delta/index.txt"), sink.clone())?;

    let report = applier.apply().await?;
    assert_eq!(report.files_applied, 2);
    assert!(report.bytes_downloaded > 0);
    assert_eq!(report.watermark_after, 200);
    assert_eq!(sink.len(), 2);

    let again = applier.apply().await?;
    assert_eq!(again.files_applied, 0);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_download_streams_to_destination() -> Result<()> {
    let body = gzip_lines(&(0..500).map(|i| product(&i.to_string(), i)).collect::<Vec<_>>());
    let mut server = MockFeedServer::new();
    server.add_file("feed_1_a.gz", body.clone());
    let base_url = server.start().await;

    let dir = tempdir()?;
    let destination = dir.path().join("feed_1_a.gz");
    let client = HttpFeedClient::new(30)?;

    let bytes = client
        .download(&format!("{base_url}/delta/feed_1_a.gz"), &destination)
        .await?;

    assert_eq!(bytes, body.len() as u64);
    assert_eq!(std::fs::read(&destination)?, body);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_manifest_error_status_is_feed_unavailable() -> Result<()> {
    let mut server = MockFeedServer::new();
    let base_url = server.start().await;

    let sink = Arc::new(MemorySink::new());
    let applier = http_applier(&format!("{base_url}/status/503"), sink)?;

    match applier.apply().await {
        Err(SyncError::FeedUnavailable {
            source: FeedError::Status { status, .. },
            ..
        }) => assert_eq!(status, 503),
        other => panic!("expected FeedUnavailable, got {other:?}"),
    }

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_missing_delta_is_download_failure() -> Result<()> {
    let mut server = MockFeedServer::new();
    server.add_file("index.txt", b"feed_100_a.gz\n".to_vec());
    let base_url = server.start().await;

    let sink = Arc::new(MemorySink::new());
    let applier = http_applier(&format!("{base_url}/delta/index.txt"), sink.clone())?;

    match applier.apply().await {
        Err(SyncError::DownloadFailed {
            filename,
            source: FeedError::Status { status, .. },
            ..
        }) => {
            assert_eq!(filename, "feed_100_a.gz");
            assert_eq!(status, 404);
        }
        other => panic!("expected DownloadFailed, got {other:?}"),
    }
    assert!(sink.is_empty());

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_unreachable_feed() -> Result<()> {
    // Nothing listens on port 9 locally
    let client = HttpFeedClient::new(5)?;
    let result = client.fetch_text("http://127.0.0.1:9/delta/index.txt").await;

    assert!(matches!(result, Err(FeedError::Transport { .. })));
    Ok(())
}
