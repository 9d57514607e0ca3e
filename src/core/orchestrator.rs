//! Backup job execution.
//!
//! [`BackupEngine::execute`] drives one job through its state machine:
//!
//! ```text
//! Inactive -> Active -> (Paused <-> Active) -> Completed | Error | Stopped
//!          \-> Interrupted (business software running at start)
//! ```
//!
//! Files are processed one at a time. Pause and stop requests are observed
//! before each file; a file already being copied always finishes.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::control::{GateOutcome, JobControl, JobControls};
use super::error::BackupError;
use super::models::{BackupJob, BackupMode, BackupProgress, BackupState, LogRecord};
use super::process::ProcessProbe;
use super::scanner::scan_directory;
use super::selector::{Selection, prioritize, select_differential};
use super::sinks::{LogSink, StateSink};
use super::transfer_engine::{Encryptor, TransferOutcome, TransferUnit};

/// Final report of a run that reached Completed, Error or Stopped.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub state: BackupState,
    pub files_transferred: u64,
    pub files_failed: u64,
    pub files_skipped: u64,
    pub progress: BackupProgress,
}

#[derive(Debug, Default)]
struct RunCounters {
    transferred: u64,
    failed: u64,
    skipped: u64,
}

/// Executes backup jobs and owns the table of live job controls.
pub struct BackupEngine {
    transfer: TransferUnit,
    log: Arc<dyn LogSink>,
    state: Arc<dyn StateSink>,
    probe: Arc<dyn ProcessProbe>,
    business_software: Option<PathBuf>,
    controls: JobControls,
}

impl BackupEngine {
    pub fn new(
        log: Arc<dyn LogSink>,
        state: Arc<dyn StateSink>,
        encryptor: Arc<dyn Encryptor>,
        probe: Arc<dyn ProcessProbe>,
    ) -> Self {
        Self {
            transfer: TransferUnit::new(encryptor, log.clone()),
            log,
            state,
            probe,
            business_software: None,
            controls: JobControls::new(),
        }
    }

    /// Refuse to start jobs while a process runs from this executable.
    pub fn with_business_software(mut self, executable: Option<PathBuf>) -> Self {
        self.business_software = executable.filter(|p| !p.as_os_str().is_empty());
        self
    }

    /// `None` disables the per-file size limit.
    pub fn with_max_file_size(mut self, limit: Option<u64>) -> Self {
        self.transfer = self.transfer.with_max_file_size(limit);
        self
    }

    pub fn controls(&self) -> &JobControls {
        &self.controls
    }

    pub fn pause(&self, job_name: &str) -> bool {
        self.controls.pause(job_name)
    }

    pub fn resume(&self, job_name: &str) -> bool {
        self.controls.resume(job_name)
    }

    pub fn stop(&self, job_name: &str) -> bool {
        self.controls.stop(job_name)
    }

    pub fn stop_all(&self) {
        self.controls.stop_all();
    }

    pub fn active_jobs(&self) -> Vec<String> {
        self.controls.active_names()
    }

    /// Run `job` to a terminal state.
    ///
    /// Returns `Err` only when the job could not run at all: an invalid job,
    /// a job already running under the same name, or the business software
    /// check. Every other failure ends as [`BackupState::Error`] in the summary.
    pub async fn execute(&self, job: &BackupJob) -> Result<JobSummary, BackupError> {
        if job.name.trim().is_empty() {
            return Err(BackupError::InvalidJob("job name must not be empty".into()));
        }
        let lease = self
            .controls
            .lease(&job.name)
            .ok_or_else(|| BackupError::AlreadyRunning(job.name.clone()))?;

        let span = info_span!("backup_job", job = %job.name, run_id = %Uuid::now_v7());
        self.run(job, lease.control()).instrument(span).await
    }

    async fn run(&self, job: &BackupJob, control: &JobControl) -> Result<JobSummary, BackupError> {
        let mut progress = BackupProgress::new(&job.name);

        if let Some(software) = self.blocking_software() {
            let err = BackupError::Interrupted {
                job: job.name.clone(),
                software,
            };
            warn!(error = %err, "Backup job interrupted");
            self.log_record(LogRecord::job(&job.name, err.to_string()))
                .await;
            progress.state = BackupState::Interrupted;
            self.publish(&mut progress).await;
            return Err(err);
        }

        let mut counters = RunCounters::default();
        let outcome = if job.source.is_dir() {
            info!(mode = ?job.mode, source = %job.source.display(), target = %job.target.display(), "Backup job started");
            progress.state = BackupState::Active;
            self.publish(&mut progress).await;
            self.process_files(job, control, &mut progress, &mut counters)
                .await
        } else {
            Err(BackupError::DirectoryNotFound(job.source.clone()))
        };

        match outcome {
            Ok(()) => {
                if control.is_stopped() {
                    progress.state = BackupState::Stopped;
                } else if counters.failed > 0 {
                    progress.state = BackupState::Error;
                } else {
                    progress.state = BackupState::Completed;
                    progress.remaining_files = 0;
                    progress.remaining_bytes = 0;
                }
            }
            Err(e) => {
                error!(error = %e, "Backup job failed");
                self.log_record(LogRecord::job(
                    &job.name,
                    format!("Job execution failed: {e}"),
                ))
                .await;
                progress.state = BackupState::Error;
            }
        }

        progress.clear_current();
        self.publish(&mut progress).await;

        info!(
            state = %progress.state,
            transferred = counters.transferred,
            failed = counters.failed,
            skipped = counters.skipped,
            "Backup job finished"
        );

        Ok(JobSummary {
            state: progress.state,
            files_transferred: counters.transferred,
            files_failed: counters.failed,
            files_skipped: counters.skipped,
            progress,
        })
    }

    async fn process_files(
        &self,
        job: &BackupJob,
        control: &JobControl,
        progress: &mut BackupProgress,
        counters: &mut RunCounters,
    ) -> Result<(), BackupError> {
        let selection = self.select_files(job).await?;
        progress.set_totals(selection.files.len() as u64, selection.total_bytes);
        self.publish(progress).await;

        tokio::fs::create_dir_all(&job.target).await?;

        for file in &selection.files {
            if control.is_paused() {
                progress.state = BackupState::Paused;
                self.publish(progress).await;
                info!("Backup job paused");

                if control.wait_while_paused().await == GateOutcome::Stopped {
                    break;
                }

                progress.state = BackupState::Active;
                self.publish(progress).await;
                info!("Backup job resumed");
            }

            if control.is_stopped() {
                info!("Backup job stop requested");
                break;
            }

            progress.current_source = Some(file.path.clone());
            progress.current_target = Some(file.destination(job));
            self.publish(progress).await;

            match self.transfer.transfer(job, file).await {
                TransferOutcome::Failed { .. } => counters.failed += 1,
                TransferOutcome::Skipped { .. } => counters.skipped += 1,
                TransferOutcome::Copied { .. } | TransferOutcome::Encrypted { .. } => {
                    counters.transferred += 1
                }
            }

            progress.file_handled(file.size);
            self.publish(progress).await;
        }

        Ok(())
    }

    async fn select_files(&self, job: &BackupJob) -> Result<Selection, BackupError> {
        let job = job.clone();
        let selection = tokio::task::spawn_blocking(move || -> Result<Selection, BackupError> {
            let files = scan_directory(&job.source)?;
            Ok(match job.mode {
                BackupMode::Full => {
                    let mut selection = Selection::all(files);
                    prioritize(&mut selection.files, &job);
                    selection
                }
                BackupMode::Differential => select_differential(files, &job),
            })
        })
        .await??;

        debug!(
            files = selection.files.len(),
            bytes = selection.total_bytes,
            "Files selected"
        );
        Ok(selection)
    }

    fn blocking_software(&self) -> Option<PathBuf> {
        let software = self.business_software.as_ref()?;
        self.probe
            .is_running(software)
            .then(|| software.clone())
    }

    async fn publish(&self, progress: &mut BackupProgress) {
        progress.timestamp = chrono::Local::now();
        if let Err(e) = self.state.publish(progress.clone()).await {
            warn!(error = %e, "Failed to publish progress");
        }
        progress.sequence += 1;
    }

    async fn log_record(&self, record: LogRecord) {
        if let Err(e) = self.log.append(record).await {
            warn!(error = %e, "Failed to write log record");
        }
    }
}
