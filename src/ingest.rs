//! Log file ingestion.
//!
//! Reads a JSON-lines log (one entry object per line), builds the
//! [`LogFile`] record and its ordered [`LogEntry`] rows, and stores both.
//!
//! Each line carries `timestamp`, `level`, `message` and optionally
//! `error_code`, `service`, `host`, `metadata`. `timestamp` is either an
//! RFC 3339 string or a Unix epoch number (seconds, or milliseconds when
//! the value is too large to be seconds). Lines that fail to parse are
//! skipped and counted; the first failure is kept as the file's
//! `parse_error`. A file where no line parses is stored as `failed`.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};

use autolog_core::models::{LogEntry, LogFile, ProcessingStatus};
use autolog_core::store::Store;

use crate::config::Config;
use crate::service;

/// Epoch values above this are read as milliseconds.
const MAX_EPOCH_SECONDS: i64 = 100_000_000_000;

#[derive(Debug, Deserialize)]
struct RawEntry {
    timestamp: serde_json::Value,
    level: String,
    message: String,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// Outcome of parsing one upload.
#[derive(Debug)]
pub struct ParsedLog {
    pub file: LogFile,
    pub entries: Vec<LogEntry>,
    /// Non-blank lines that could not be parsed.
    pub skipped: usize,
}

fn parse_timestamp(value: &serde_json::Value) -> Result<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| format!("invalid timestamp '{}'", s)),
        serde_json::Value::Number(n) => {
            let Some(raw) = n.as_i64() else {
                bail!("invalid timestamp {}", n);
            };
            let parsed = if raw.abs() > MAX_EPOCH_SECONDS {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            };
            parsed.with_context(|| format!("timestamp out of range: {}", raw))
        }
        other => bail!("invalid timestamp {}", other),
    }
}

fn parse_line(log_file_id: &str, line: &str) -> Result<LogEntry> {
    let raw: RawEntry = serde_json::from_str(line).context("malformed JSON")?;
    let mut entry = LogEntry::new(log_file_id, raw.level.parse()?, raw.message);
    entry.timestamp = parse_timestamp(&raw.timestamp)?;
    entry.error_code = raw.error_code.filter(|s| !s.is_empty());
    entry.service = raw.service.filter(|s| !s.is_empty());
    entry.host = raw.host.filter(|s| !s.is_empty());
    entry.metadata = raw.metadata;
    Ok(entry)
}

/// Parse an upload into a log file record and its entries.
pub fn parse_log(filename: &str, content: &[u8]) -> ParsedLog {
    let mut file = LogFile::new(filename, content.len() as i64);

    let mut hasher = Sha256::new();
    hasher.update(content);
    file.content_hash = format!("{:x}", hasher.finalize());

    let text = String::from_utf8_lossy(content);
    let mut entries = Vec::new();
    let mut skipped = 0;

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(&file.id, line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                skipped += 1;
                if file.parse_error.is_none() {
                    file.parse_error = Some(format!("line {}: {:#}", idx + 1, e));
                }
            }
        }
    }

    file.tally(&entries);
    file.processing_status = if entries.is_empty() {
        if file.parse_error.is_none() {
            file.parse_error = Some("no log entries found".to_string());
        }
        ProcessingStatus::Failed
    } else {
        ProcessingStatus::Completed
    };

    ParsedLog {
        file,
        entries,
        skipped,
    }
}

/// Read `path`, parse it, and store the log file with its entries.
pub async fn ingest_file<S>(store: &S, path: &Path, uploaded_by: Option<String>) -> Result<LogFile>
where
    S: Store + ?Sized,
{
    let content =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut parsed = parse_log(&filename, &content);
    parsed.file.uploaded_by = uploaded_by;

    if parsed.skipped > 0 {
        warn!(
            file = %filename,
            skipped = parsed.skipped,
            error = parsed.file.parse_error.as_deref().unwrap_or_default(),
            "skipped unparseable log lines"
        );
    }

    store
        .insert_log_file(&parsed.file, &parsed.entries)
        .await
        .with_context(|| format!("failed to store {}", filename))?;

    info!(
        log_file_id = %parsed.file.id,
        file = %filename,
        entries = parsed.file.entry_count,
        errors = parsed.file.error_count,
        "log file ingested"
    );
    Ok(parsed.file)
}

/// `autolog ingest`: store a log file and print its record as JSON.
pub async fn run_ingest(config: &Config, path: &Path, uploaded_by: Option<String>) -> Result<()> {
    let service = service::open(config).await?;
    let file = ingest_file(service.store().as_ref(), path, uploaded_by).await?;
    println!("{}", serde_json::to_string_pretty(&file)?);
    if file.processing_status == ProcessingStatus::Failed {
        bail!(
            "no entries could be parsed from {}: {}",
            path.display(),
            file.parse_error.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}
