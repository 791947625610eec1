// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Decompress and transform stage shared by delta files and snapshots.
//!
//! Input is gzip-compressed newline-delimited JSON. Each line becomes a
//! [`CatalogRecord`] keyed by the configured identifier field.

use crate::error::ParseError;
use crate::models::CatalogRecord;
use async_compression::tokio::bufread::GzipDecoder;
use serde_json::Value;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

/// Read buffer for compressed input
const READ_BUFFER: usize = 256 * 1024;

/// Pull an integer timestamp out of a record.
///
/// Accepts JSON integers, floats with no fractional part and numeric
/// strings, the shapes the feed has been seen to use.
pub fn extract_timestamp(record: &Value, field: &str) -> Option<i64> {
    match record.get(field)? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Pull the record key out of a record; strings and numbers both qualify.
pub fn extract_key(record: &Value, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Turns JSON lines into catalog records
#[derive(Debug, Clone)]
pub struct RecordTransform {
    key_field: String,
    timestamp_field: String,
}

impl RecordTransform {
    pub fn new(key_field: impl Into<String>, timestamp_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
            timestamp_field: timestamp_field.into(),
        }
    }

    pub fn timestamp_field(&self) -> &str {
        &self.timestamp_field
    }

    /// Transform one JSON line. `Ok(None)` means the record has no key.
    pub fn parse_line(&self, line: &str) -> Result<Option<CatalogRecord>, serde_json::Error> {
        let value: Value = serde_json::from_str(line)?;
        let Some(key) = extract_key(&value, &self.key_field) else {
            return Ok(None);
        };
        let source_ts = extract_timestamp(&value, &self.timestamp_field);
        Ok(Some(CatalogRecord {
            key,
            payload: line.to_string(),
            source_ts,
        }))
    }

    /// Stream records out of a gzip body.
    pub fn records<R: AsyncRead + Unpin>(&self, reader: R) -> RecordStream<R> {
        let mut decoder = GzipDecoder::new(BufReader::with_capacity(READ_BUFFER, reader));
        // Large dumps are often written as concatenated gzip members
        decoder.multiple_members(true);

        RecordStream {
            transform: self.clone(),
            lines: BufReader::new(decoder).lines(),
            line_no: 0,
            dropped: 0,
        }
    }

    /// Read an entire gzip file into a batch.
    pub async fn read_file(&self, path: &Path) -> Result<FileBatch, ParseError> {
        let file = tokio::fs::File::open(path).await?;
        let mut stream = self.records(file);

        let mut records = Vec::new();
        while let Some(record) = stream.next_record().await? {
            records.push(record);
        }

        Ok(FileBatch {
            records,
            dropped: stream.dropped(),
        })
    }
}

/// All keyed records of one file plus the count of keyless ones.
#[derive(Debug, Default)]
pub struct FileBatch {
    pub records: Vec<CatalogRecord>,
    pub dropped: usize,
}

/// Line-by-line record reader over a gzip body
pub struct RecordStream<R> {
    transform: RecordTransform,
    lines: Lines<BufReader<GzipDecoder<BufReader<R>>>>,
    line_no: usize,
    dropped: usize,
}

impl<R: AsyncRead + Unpin> RecordStream<R> {
    /// Next keyed record, skipping blank lines and keyless records.
    pub async fn next_record(&mut self) -> Result<Option<CatalogRecord>, ParseError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match self.transform.parse_line(line) {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => self.dropped += 1,
                Err(source) => {
                    return Err(ParseError::Json {
                        line: self.line_no,
                        source,
                    });
                }
            }
        }
        Ok(None)
    }

    /// Records dropped so far for lacking a key
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Lines consumed so far
    pub fn lines_read(&self) -> usize {
        self.line_no
    }
}
