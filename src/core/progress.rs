//! In-memory progress tracking for jobs.
//!
//! Holds the latest snapshot per job name. Unlike the live control table, a
//! job's entry survives its terminal state so callers can still read the final
//! counters; the next run of the same job overwrites it.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::models::BackupProgress;
use super::sinks::StateSink;

/// Thread-safe store of the most recent snapshot for each job.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<RwLock<HashMap<String, BackupProgress>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn update(&self, progress: BackupProgress) {
        let mut map = self.inner.write().await;
        map.insert(progress.job_name.clone(), progress);
    }

    pub async fn get(&self, job_name: &str) -> Option<BackupProgress> {
        let map = self.inner.read().await;
        map.get(job_name).cloned()
    }

    pub async fn get_all(&self) -> HashMap<String, BackupProgress> {
        let map = self.inner.read().await;
        map.clone()
    }

    /// Number of tracked jobs not yet in a terminal state.
    pub async fn active_count(&self) -> usize {
        let map = self.inner.read().await;
        map.values().filter(|p| !p.state.is_terminal()).count()
    }
}

#[async_trait]
impl StateSink for ProgressTracker {
    async fn publish(&self, progress: BackupProgress) -> Result<()> {
        self.update(progress).await;
        Ok(())
    }
}
