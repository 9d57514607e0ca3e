//! Outbound seams of the engine: the business log and progress snapshots.
//!
//! Sinks are injected into the engine at construction. A sink error never
//! fails a job; the engine logs it and moves on.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::models::{BackupProgress, LogRecord};

/// Receives one record per file operation plus job-level records.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append(&self, record: LogRecord) -> Result<()>;
}

/// Receives a snapshot after every state transition and every file.
///
/// Snapshots of one job arrive in the order they were produced.
#[async_trait]
pub trait StateSink: Send + Sync {
    async fn publish(&self, progress: BackupProgress) -> Result<()>;
}

/// Forwards a record to every inner sink, returning the first failure.
#[derive(Clone, Default)]
pub struct LogSinks(Vec<Arc<dyn LogSink>>);

impl LogSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.0.push(sink);
        self
    }
}

#[async_trait]
impl LogSink for LogSinks {
    async fn append(&self, record: LogRecord) -> Result<()> {
        let mut first_err = None;
        for sink in &self.0 {
            if let Err(e) = sink.append(record.clone()).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[derive(Clone, Default)]
pub struct StateSinks(Vec<Arc<dyn StateSink>>);

impl StateSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn StateSink>) -> Self {
        self.0.push(sink);
        self
    }
}

#[async_trait]
impl StateSink for StateSinks {
    async fn publish(&self, progress: BackupProgress) -> Result<()> {
        let mut first_err = None;
        for sink in &self.0 {
            if let Err(e) = sink.publish(progress.clone()).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Keeps every record in memory.
#[derive(Clone, Default)]
pub struct MemoryLogSink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LogSink for MemoryLogSink {
    async fn append(&self, record: LogRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("log record store poisoned"))?
            .push(record);
        Ok(())
    }
}

/// Streams snapshots to an observer (UI, network broadcaster) over a channel.
#[derive(Clone)]
pub struct ProgressChannel {
    tx: mpsc::UnboundedSender<BackupProgress>,
}

impl ProgressChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BackupProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl StateSink for ProgressChannel {
    async fn publish(&self, progress: BackupProgress) -> Result<()> {
        // A dropped observer is not the job's problem.
        let _ = self.tx.send(progress);
        Ok(())
    }
}

/// Discards everything.
#[derive(Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl LogSink for NullSink {
    async fn append(&self, _record: LogRecord) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl StateSink for NullSink {
    async fn publish(&self, _progress: BackupProgress) -> Result<()> {
        Ok(())
    }
}
