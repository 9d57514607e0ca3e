//! Daily XML business log.
//!
//! Each day's file holds a single `<LogEntries>` document. Appending a record
//! reads the document, adds one `<LogEntry>` and rewrites the file.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use quick_xml::se::Serializer;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

use crate::core::{LogRecord, LogSink};

const ROOT: &str = "LogEntries";
const DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XmlLogEntry {
    job_name: String,
    source_file: String,
    target_file: String,
    file_size: u64,
    transfer_time_sec: f64,
    encryption_time_ms: i64,
    timestamp: String,
    #[serde(default)]
    message: String,
}

impl From<&LogRecord> for XmlLogEntry {
    fn from(record: &LogRecord) -> Self {
        let path = |p: &Option<PathBuf>| {
            p.as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };
        Self {
            job_name: record.job_name.clone(),
            source_file: path(&record.source),
            target_file: path(&record.target),
            file_size: record.file_size,
            transfer_time_sec: record.transfer_time_ms as f64 / 1000.0,
            encryption_time_ms: record.encryption_time_ms,
            timestamp: record.timestamp.format("%d/%m/%Y %H:%M:%S").to_string(),
            message: record.message.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LogEntries {
    #[serde(rename = "LogEntry", default)]
    entries: Vec<XmlLogEntry>,
}

impl LogEntries {
    fn render(&self) -> Result<String> {
        let mut xml = String::from(DECLARATION);
        let mut serializer = Serializer::with_root(&mut xml, Some(ROOT))?;
        serializer.indent(' ', 2);
        self.serialize(serializer)?;
        xml.push('\n');
        Ok(xml)
    }
}

/// Appends records to `<directory>/<YYYY-MM-DD>.xml`.
pub struct XmlLogWriter {
    directory: PathBuf,
    lock: Mutex<()>,
}

impl XmlLogWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn file_for(&self, timestamp: &DateTime<Local>) -> PathBuf {
        self.directory
            .join(format!("{}.xml", timestamp.format("%Y-%m-%d")))
    }
}

/// Existing entries of `path`. An unreadable document starts a fresh one.
async fn load(path: &Path) -> Result<LogEntries> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LogEntries::default()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    if content.trim().is_empty() {
        return Ok(LogEntries::default());
    }

    Ok(quick_xml::de::from_str(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Replacing unreadable XML log");
        LogEntries::default()
    }))
}

#[async_trait]
impl LogSink for XmlLogWriter {
    async fn append(&self, record: LogRecord) -> Result<()> {
        let entry = XmlLogEntry::from(&record);
        let path = self.file_for(&record.timestamp);

        let _guard = self.lock.lock().await;
        tokio::fs::create_dir_all(&self.directory)
            .await
            .with_context(|| format!("Failed to create {}", self.directory.display()))?;

        let mut log = load(&path).await?;
        log.entries.push(entry);
        tokio::fs::write(&path, log.render()?)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
