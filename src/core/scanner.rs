//! Source tree enumeration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

use super::error::BackupError;
use super::models::{BackupJob, encrypted_path};

/// A regular file found under a job's source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Path relative to the source root
    pub relative: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl SourceFile {
    /// Where this file lands under `target_root` for the given job, accounting
    /// for the `.crypt` suffix of encrypted files.
    pub fn destination(&self, job: &BackupJob) -> PathBuf {
        let plain = job.target.join(&self.relative);
        if job.should_encrypt(&self.path) {
            encrypted_path(&plain)
        } else {
            plain
        }
    }
}

/// Recursively collect every regular file under `root`.
///
/// Symlinks and special files are skipped. Entries that cannot be stat'ed are
/// logged and skipped; an unreadable directory fails the scan.
pub fn scan_directory(root: &Path) -> Result<Vec<SourceFile>, BackupError> {
    if !root.is_dir() {
        return Err(BackupError::DirectoryNotFound(root.to_path_buf()));
    }

    let mut files = Vec::new();
    scan_directory_recursive(root, root, &mut files)?;
    Ok(files)
}

fn scan_directory_recursive(
    base: &Path,
    current: &Path,
    files: &mut Vec<SourceFile>,
) -> Result<(), BackupError> {
    let mut entries = fs::read_dir(current)?.collect::<Result<Vec<_>, _>>()?;
    // Stable enumeration order regardless of the filesystem.
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();

        let metadata = match path.symlink_metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if metadata.is_dir() {
            scan_directory_recursive(base, &path, files)?;
        } else if metadata.is_file() {
            let relative = path
                .strip_prefix(base)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| PathBuf::from(entry.file_name()));
            files.push(SourceFile {
                relative,
                size: metadata.len(),
                modified: metadata.modified().ok(),
                path,
            });
        }
    }

    Ok(())
}

pub fn total_size(files: &[SourceFile]) -> u64 {
    files.iter().map(|f| f.size).sum()
}
