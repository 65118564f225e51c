//! JSON-lines input and output.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

use super::types::ChoiceRecord;
use crate::error::DedupResult;

/// Directory used when no output path is given.
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";

/// `outputs/deduplication-<YYYY-MM-DDTHH-MM-SS>.jsonl` for the given instant.
pub fn default_output_path(now: DateTime<Utc>) -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR).join(format!(
        "deduplication-{}.jsonl",
        now.format("%Y-%m-%dT%H-%M-%S")
    ))
}

/// Reads choice records from a JSONL file.
///
/// Blank lines are skipped. Lines that are not valid UTF-8 or not a valid
/// record are logged and skipped. With a `limit`, only the first `limit` valid records are
/// kept.
pub async fn read_records(path: &Path, limit: Option<usize>) -> DedupResult<Vec<ChoiceRecord>> {
    let file = File::open(path).await?;
    let mut segments = BufReader::new(file).split(b'\n');
    let mut records = Vec::new();
    let mut line_number = 0usize;
    let mut skipped = 0usize;

    while let Some(bytes) = segments.next_segment().await? {
        line_number += 1;
        if limit.is_some_and(|n| records.len() >= n) {
            break;
        }
        let parsed = std::str::from_utf8(&bytes)
            .map_err(|e| e.to_string())
            .and_then(|line| {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                serde_json::from_str::<ChoiceRecord>(trimmed)
                    .map(Some)
                    .map_err(|e| e.to_string())
            });
        match parsed {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => {
                skipped += 1;
                tracing::warn!(line = line_number, error = %e, "Skipping invalid input line");
            }
        }
    }

    tracing::info!(
        path = %path.display(),
        records = records.len(),
        skipped,
        "Loaded input records"
    );
    Ok(records)
}

/// Appends serialized records to a JSONL file.
pub struct JsonlWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl JsonlWriter {
    /// Creates (or truncates) the file, creating parent directories.
    pub async fn create(path: &Path) -> DedupResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = File::create(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub async fn write<T: Serialize>(&mut self, record: &T) -> DedupResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.written += 1;
        Ok(())
    }

    pub async fn flush(&mut self) -> DedupResult<()> {
        self.writer.flush().await?;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
