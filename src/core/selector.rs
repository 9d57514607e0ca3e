//! File selection for differential runs and priority ordering for full runs.

use std::fs;

use super::models::BackupJob;
use super::scanner::{SourceFile, total_size};

/// Files chosen for a run and their aggregate size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub files: Vec<SourceFile>,
    pub total_bytes: u64,
}

impl Selection {
    pub fn all(files: Vec<SourceFile>) -> Self {
        let total_bytes = total_size(&files);
        Self { files, total_bytes }
    }
}

/// Keep the files whose destination is missing, older than the source, or
/// (for unencrypted files) of a different size.
///
/// Only reads metadata, so calling it twice on an unchanged pair of trees
/// yields the same selection.
pub fn select_differential(files: Vec<SourceFile>, job: &BackupJob) -> Selection {
    let files: Vec<SourceFile> = files
        .into_iter()
        .filter(|file| needs_copy(file, job))
        .collect();
    Selection::all(files)
}

fn needs_copy(file: &SourceFile, job: &BackupJob) -> bool {
    let destination = file.destination(job);
    let dst = match fs::metadata(&destination) {
        Ok(m) => m,
        Err(_) => return true,
    };

    if let (Some(src_mtime), Ok(dst_mtime)) = (file.modified, dst.modified()) {
        if src_mtime > dst_mtime {
            return true;
        }
    }

    // Ciphertext size says nothing about the plaintext size.
    if job.should_encrypt(&file.path) {
        return false;
    }

    dst.len() != file.size
}

/// Move files matching the job's priority extension ahead of the rest,
/// keeping enumeration order within each group.
pub fn prioritize(files: &mut [SourceFile], job: &BackupJob) {
    if job.priority_trigger().is_none() {
        return;
    }
    files.sort_by_key(|f| !job.is_priority(&f.path));
}
