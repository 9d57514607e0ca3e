//! Per-file transfer: plain copy or delegated encryption, timed and logged.

pub mod crypto;
pub mod native_copy;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::models::{BackupJob, LogRecord, encrypted_path};
use super::scanner::SourceFile;
use super::sinks::LogSink;

pub use crypto::{CryptoTool, EncryptError};

/// Default size above which files are skipped (100 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Encrypts `source` into `dest_dir`, returning the elapsed milliseconds.
#[async_trait]
pub trait Encryptor: Send + Sync {
    async fn encrypt(&self, source: &Path, dest_dir: &Path) -> Result<u64, EncryptError>;
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Copied { elapsed_ms: u64 },
    Encrypted { elapsed_ms: u64 },
    /// Over the size limit; nothing written.
    Skipped { limit: u64 },
    Failed {
        message: String,
        /// Negative encryption code, 0 for non-encryption failures.
        encryption_code: i64,
    },
}

impl TransferOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, TransferOutcome::Failed { .. })
    }

    fn failed(message: impl Into<String>) -> Self {
        TransferOutcome::Failed {
            message: message.into(),
            encryption_code: 0,
        }
    }
}

/// Transfers one file at a time and writes exactly one log record for it.
///
/// Ordinary I/O failures are turned into [`TransferOutcome::Failed`]; nothing
/// escapes as an error.
pub struct TransferUnit {
    encryptor: Arc<dyn Encryptor>,
    log: Arc<dyn LogSink>,
    max_file_size: Option<u64>,
}

impl TransferUnit {
    pub fn new(encryptor: Arc<dyn Encryptor>, log: Arc<dyn LogSink>) -> Self {
        Self {
            encryptor,
            log,
            max_file_size: Some(DEFAULT_MAX_FILE_SIZE),
        }
    }

    /// `None` disables the size limit.
    pub fn with_max_file_size(mut self, limit: Option<u64>) -> Self {
        self.max_file_size = limit;
        self
    }

    pub async fn transfer(&self, job: &BackupJob, file: &SourceFile) -> TransferOutcome {
        let target = file.destination(job);
        let outcome = self.run(job, file).await;

        let mut record = LogRecord::file(&job.name, &file.path, &target, file.size);
        match &outcome {
            TransferOutcome::Copied { elapsed_ms } => {
                record.transfer_time_ms = *elapsed_ms as i64;
            }
            TransferOutcome::Encrypted { elapsed_ms } => {
                record.encryption_time_ms = *elapsed_ms as i64;
            }
            TransferOutcome::Skipped { limit } => {
                record.message = format!("skipped: exceeds size limit of {limit} bytes");
            }
            TransferOutcome::Failed {
                message,
                encryption_code,
            } => {
                warn!(file = %file.path.display(), error = %message, "File transfer failed");
                record.transfer_time_ms = -1;
                record.encryption_time_ms = *encryption_code;
                record.message = message.clone();
            }
        }

        if let Err(e) = self.log.append(record).await {
            warn!(file = %file.path.display(), error = %e, "Failed to write log record");
        }

        outcome
    }

    async fn run(&self, job: &BackupJob, file: &SourceFile) -> TransferOutcome {
        let plain = job.target.join(&file.relative);
        let Some(dest_dir) = plain.parent().map(Path::to_path_buf) else {
            return TransferOutcome::failed("destination has no parent directory");
        };

        if let Err(e) = tokio::fs::create_dir_all(&dest_dir).await {
            return TransferOutcome::failed(format!(
                "failed to create directory {}: {e}",
                dest_dir.display()
            ));
        }

        if let Some(limit) = self.max_file_size.filter(|limit| file.size > *limit) {
            debug!(file = %file.path.display(), size = file.size, limit, "Skipping oversized file");
            return TransferOutcome::Skipped { limit };
        }

        if job.should_encrypt(&file.path) {
            debug!(file = %file.path.display(), target = %encrypted_path(&plain).display(), "Encrypting file");
            return match self.encryptor.encrypt(&file.path, &dest_dir).await {
                Ok(elapsed_ms) => TransferOutcome::Encrypted { elapsed_ms },
                Err(e) => TransferOutcome::Failed {
                    message: format!("encryption failed: {e}"),
                    encryption_code: e.code(),
                },
            };
        }

        debug!(file = %file.path.display(), size = file.size, "Copying file");
        let source = file.path.clone();
        let start = Instant::now();
        let copied =
            tokio::task::spawn_blocking(move || native_copy::copy_single_file(&source, &plain))
                .await;

        match copied {
            Ok(Ok(_)) => TransferOutcome::Copied {
                elapsed_ms: start.elapsed().as_millis() as u64,
            },
            Ok(Err(e)) => TransferOutcome::failed(format!("copy failed: {e}")),
            Err(e) => TransferOutcome::failed(format!("copy task failed: {e}")),
        }
    }
}
