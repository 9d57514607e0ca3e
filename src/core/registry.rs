//! Concurrent and sequential execution of several jobs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::BackupError;
use super::models::BackupJob;
use super::orchestrator::{BackupEngine, JobSummary};

pub type JobResult = Result<JobSummary, BackupError>;

/// Tracks one running task per job name on top of a shared [`BackupEngine`].
pub struct JobRegistry {
    engine: Arc<BackupEngine>,
    tasks: Mutex<HashMap<String, JoinHandle<JobResult>>>,
}

impl JobRegistry {
    pub fn new(engine: Arc<BackupEngine>) -> Self {
        Self {
            engine,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<BackupEngine> {
        &self.engine
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<JobResult>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Launch every job on its own task. Jobs whose name already has an
    /// unfinished task are skipped. Returns the names that were started.
    pub fn start_many(&self, jobs: impl IntoIterator<Item = BackupJob>) -> Vec<String> {
        let mut tasks = self.tasks();
        let mut started = Vec::new();

        for job in jobs {
            if job.name.trim().is_empty() {
                warn!("Ignoring job without a name");
                continue;
            }
            if tasks.get(&job.name).is_some_and(|t| !t.is_finished()) {
                debug!(job = %job.name, "Job already running, skipping");
                continue;
            }

            let engine = self.engine.clone();
            let name = job.name.clone();
            let handle = tokio::spawn(async move { engine.execute(&job).await });
            tasks.insert(name.clone(), handle);
            info!(job = %name, "Job queued for parallel execution");
            started.push(name);
        }

        started
    }

    /// Run jobs one after another through the same engine.
    pub async fn run_sequentially(
        &self,
        jobs: impl IntoIterator<Item = BackupJob>,
    ) -> Vec<(String, JobResult)> {
        let mut results = Vec::new();
        for job in jobs {
            let result = self.engine.execute(&job).await;
            results.push((job.name, result));
        }
        results
    }

    /// Wait for every tracked task and hand back its result, in name order.
    pub async fn wait_all(&self) -> Vec<(String, JobResult)> {
        let mut handles: Vec<_> = self.tasks().drain().collect();
        handles.sort_by(|a, b| a.0.cmp(&b.0));

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(BackupError::Task(e)),
            };
            results.push((name, result));
        }
        results
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.tasks().get(name).is_some_and(|t| !t.is_finished())
    }

    /// Drop bookkeeping for tasks that have finished. Their results are discarded.
    pub fn clear_finished(&self) {
        self.tasks().retain(|_, task| !task.is_finished());
    }

    pub fn pause(&self, name: &str) -> bool {
        self.engine.pause(name)
    }

    pub fn resume(&self, name: &str) -> bool {
        self.engine.resume(name)
    }

    pub fn stop(&self, name: &str) -> bool {
        self.engine.stop(name)
    }

    pub fn stop_all(&self) {
        self.engine.stop_all();
    }
}
