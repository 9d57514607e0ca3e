//! Job-level errors.
//!
//! File-level failures never show up here: the transfer unit turns them into
//! a log record and an errored outcome so the run can continue.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    /// The configured business application is running; the job did not start.
    #[error("backup job '{job}' cannot start: business software {} is running", software.display())]
    Interrupted { job: String, software: PathBuf },

    #[error("source directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("invalid backup job: {0}")]
    InvalidJob(String),

    #[error("backup job '{0}' is already running")]
    AlreadyRunning(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl BackupError {
    /// True when the job was blocked by the pre-flight check and may be retried later.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, BackupError::Interrupted { .. })
    }
}
