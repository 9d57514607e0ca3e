use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How a job decides which source files to transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    /// Every file under the source, unconditionally overwriting the destination.
    #[default]
    Full,
    /// Only files missing, newer, or size-mismatched at the destination.
    Differential,
}

/// A named backup configuration. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupJob {
    pub name: String,
    pub source: PathBuf,
    pub target: PathBuf,
    #[serde(default)]
    pub mode: BackupMode,
    /// Files with this extension go through the external encryption tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_extension: Option<String>,
    /// Files with this extension are transferred first in a full run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_extension: Option<String>,
}

impl BackupJob {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        mode: BackupMode,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            target: target.into(),
            mode,
            encryption_extension: None,
            priority_extension: None,
        }
    }

    pub fn with_encryption(mut self, extension: impl Into<String>) -> Self {
        self.encryption_extension = Some(extension.into());
        self
    }

    pub fn with_priority(mut self, extension: impl Into<String>) -> Self {
        self.priority_extension = Some(extension.into());
        self
    }

    /// Encryption-trigger extension without a leading dot, if one is configured.
    pub fn encryption_trigger(&self) -> Option<&str> {
        normalize_extension(self.encryption_extension.as_deref())
    }

    pub fn priority_trigger(&self) -> Option<&str> {
        normalize_extension(self.priority_extension.as_deref())
    }

    pub fn should_encrypt(&self, path: &Path) -> bool {
        self.encryption_trigger()
            .is_some_and(|ext| has_extension(path, ext))
    }

    pub fn is_priority(&self, path: &Path) -> bool {
        self.priority_trigger()
            .is_some_and(|ext| has_extension(path, ext))
    }
}

/// Strips a leading dot and maps empty / "none" to no extension.
fn normalize_extension(ext: Option<&str>) -> Option<&str> {
    let ext = ext?.trim().trim_start_matches('.');
    if ext.is_empty() || ext.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(ext)
    }
}

/// Case-insensitive extension match.
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Suffix appended to the file name of encrypted destinations.
pub const ENCRYPTED_SUFFIX: &str = ".crypt";

/// Destination path of an encrypted file: the plain destination with `.crypt` appended.
pub fn encrypted_path(plain: &Path) -> PathBuf {
    let mut name = plain.as_os_str().to_owned();
    name.push(ENCRYPTED_SUFFIX);
    PathBuf::from(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BackupState {
    /// Not started yet, or reset after a terminal state.
    #[default]
    Inactive,
    Active,
    Paused,
    Completed,
    Error,
    Stopped,
    /// Blocked at start by a running business application.
    Interrupted,
}

impl BackupState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BackupState::Completed
                | BackupState::Error
                | BackupState::Stopped
                | BackupState::Interrupted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupState::Inactive => "INACTIVE",
            BackupState::Active => "ACTIVE",
            BackupState::Paused => "PAUSED",
            BackupState::Completed => "COMPLETED",
            BackupState::Error => "ERROR",
            BackupState::Stopped => "STOPPED",
            BackupState::Interrupted => "INTERRUPTED",
        }
    }
}

impl std::fmt::Display for BackupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a running job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupProgress {
    pub job_name: String,
    /// Position of this snapshot within its run, starting at 0.
    pub sequence: u64,
    pub timestamp: DateTime<Local>,
    pub state: BackupState,
    pub total_files: u64,
    pub total_bytes: u64,
    pub remaining_files: u64,
    pub remaining_bytes: u64,
    pub current_source: Option<PathBuf>,
    pub current_target: Option<PathBuf>,
}

impl BackupProgress {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            sequence: 0,
            timestamp: Local::now(),
            state: BackupState::Inactive,
            total_files: 0,
            total_bytes: 0,
            remaining_files: 0,
            remaining_bytes: 0,
            current_source: None,
            current_target: None,
        }
    }

    /// Completion percentage by file count, 0 when there is nothing to do.
    pub fn percentage(&self) -> u8 {
        if self.total_files == 0 {
            return 0;
        }
        let done = self.total_files.saturating_sub(self.remaining_files) as f64;
        (100.0 * done / self.total_files as f64).round().clamp(0.0, 100.0) as u8
    }

    pub(crate) fn set_totals(&mut self, files: u64, bytes: u64) {
        self.total_files = files;
        self.total_bytes = bytes;
        self.remaining_files = files;
        self.remaining_bytes = bytes;
    }

    /// Marks one file as handled, whatever its outcome.
    pub(crate) fn file_handled(&mut self, size: u64) {
        self.remaining_files = self.remaining_files.saturating_sub(1);
        self.remaining_bytes = self.remaining_bytes.saturating_sub(size);
    }

    pub(crate) fn clear_current(&mut self) {
        self.current_source = None;
        self.current_target = None;
    }
}

/// One entry of the business log: a file operation or a job-level event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub job_name: String,
    pub source: Option<PathBuf>,
    pub target: Option<PathBuf>,
    pub file_size: u64,
    /// Copy duration in milliseconds, -1 when the operation failed.
    pub transfer_time_ms: i64,
    /// Encryption duration in milliseconds, negative codes for encryption failures.
    pub encryption_time_ms: i64,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl LogRecord {
    /// A record for a single file.
    pub fn file(job_name: &str, source: &Path, target: &Path, file_size: u64) -> Self {
        Self {
            job_name: job_name.to_string(),
            source: Some(source.to_path_buf()),
            target: Some(target.to_path_buf()),
            file_size,
            transfer_time_ms: 0,
            encryption_time_ms: 0,
            message: String::new(),
            timestamp: Local::now(),
        }
    }

    /// A record not tied to a file (interruption, fatal failure).
    pub fn job(job_name: &str, message: impl Into<String>) -> Self {
        Self {
            job_name: job_name.to_string(),
            source: None,
            target: None,
            file_size: 0,
            transfer_time_ms: 0,
            encryption_time_ms: 0,
            message: message.into(),
            timestamp: Local::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.transfer_time_ms < 0 || self.encryption_time_ms < 0
    }
}
