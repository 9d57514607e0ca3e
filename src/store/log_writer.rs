//! Daily JSON-lines business log.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::core::{LogRecord, LogSink};

/// One line of the daily log file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct LogLine<'a> {
    name: &'a str,
    file_source: String,
    file_target: String,
    file_size: u64,
    /// Seconds, rounded to the millisecond. Negative on failure.
    file_transfer_time: f64,
    /// Milliseconds, or a negative encryption error code.
    encryption_time: i64,
    time: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    message: String,
}

impl<'a> From<&'a LogRecord> for LogLine<'a> {
    fn from(record: &'a LogRecord) -> Self {
        let path = |p: &Option<PathBuf>| {
            p.as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };
        Self {
            name: &record.job_name,
            file_source: path(&record.source),
            file_target: path(&record.target),
            file_size: record.file_size,
            file_transfer_time: record.transfer_time_ms as f64 / 1000.0,
            encryption_time: record.encryption_time_ms,
            time: record.timestamp.format("%d/%m/%Y %H:%M:%S").to_string(),
            message: record.message.clone(),
        }
    }
}

/// Appends records as JSON lines to `<directory>/<YYYY-MM-DD>.json`.
pub struct JsonLogWriter {
    directory: PathBuf,
    lock: Mutex<()>,
}

impl JsonLogWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn file_for(&self, timestamp: &DateTime<Local>) -> PathBuf {
        self.directory
            .join(format!("{}.json", timestamp.format("%Y-%m-%d")))
    }
}

#[async_trait]
impl LogSink for JsonLogWriter {
    async fn append(&self, record: LogRecord) -> Result<()> {
        let mut line = serde_json::to_string(&LogLine::from(&record))?;
        line.push('\n');
        let path = self.file_for(&record.timestamp);

        let _guard = self.lock.lock().await;
        tokio::fs::create_dir_all(&self.directory)
            .await
            .with_context(|| format!("Failed to create {}", self.directory.display()))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_appends_one_json_line_per_record() {
        let temp = tempdir().unwrap();
        let writer = Arc::new(JsonLogWriter::new(temp.path().join("logs")));

        let mut ok = LogRecord::file("docs", Path::new("/s/a.txt"), Path::new("/t/a.txt"), 10);
        ok.transfer_time_ms = 1234;
        let mut failed = LogRecord::file("docs", Path::new("/s/b.txt"), Path::new("/t/b.txt"), 20);
        failed.transfer_time_ms = -1;
        failed.message = "copy failed".into();

        let path = writer.file_for(&ok.timestamp);
        writer.append(ok).await.unwrap();
        writer.append(failed).await.unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["Name"], "docs");
        assert_eq!(lines[0]["FileTransferTime"], 1.234);
        assert!(lines[0].get("Message").is_none());
        assert_eq!(lines[1]["FileTransferTime"], -0.001);
        assert_eq!(lines[1]["Message"], "copy failed");
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let temp = tempdir().unwrap();
        let writer = Arc::new(JsonLogWriter::new(temp.path()));

        let mut handles = Vec::new();
        for i in 0..20 {
            let writer = writer.clone();
            handles.push(tokio::spawn(async move {
                writer
                    .append(LogRecord::job(&format!("job-{i}"), "x".repeat(512)))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let path = writer.file_for(&Local::now());
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 20);
        for line in content.lines() {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }
}
