//! Per-job and aggregate state files, rewritten on every snapshot.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::core::{BackupProgress, BackupState, StateSink};

const STATE_SUFFIX: &str = "_state.json";
const AGGREGATE_FILE: &str = "state_all.json";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StateFile {
    name: String,
    source_file_path: String,
    target_file_path: String,
    state: BackupState,
    total_files_to_copy: u64,
    total_files_size: u64,
    nb_files_left_to_do: u64,
    remaining_size: u64,
    progression: u8,
    timestamp: String,
}

impl From<&BackupProgress> for StateFile {
    fn from(progress: &BackupProgress) -> Self {
        let path = |p: &Option<PathBuf>| {
            p.as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };
        Self {
            name: progress.job_name.clone(),
            source_file_path: path(&progress.current_source),
            target_file_path: path(&progress.current_target),
            state: progress.state,
            total_files_to_copy: progress.total_files,
            total_files_size: progress.total_bytes,
            nb_files_left_to_do: progress.remaining_files,
            remaining_size: progress.remaining_bytes,
            progression: progress.percentage(),
            timestamp: progress.timestamp.to_rfc3339(),
        }
    }
}

/// Writes `<job>_state.json` for each job and rebuilds `state_all.json` from
/// every per-job file after each update.
///
/// The mutex covers both files, so concurrent jobs never interleave writes to
/// the aggregate.
#[derive(Clone)]
pub struct JsonStateWriter {
    directory: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JsonStateWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn aggregate_path(&self) -> PathBuf {
        self.directory.join(AGGREGATE_FILE)
    }

    pub fn job_path(&self, job_name: &str) -> PathBuf {
        self.directory.join(format!("{job_name}{STATE_SUFFIX}"))
    }

    fn write(&self, progress: &BackupProgress) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        fs::create_dir_all(&self.directory)
            .with_context(|| format!("Failed to create {}", self.directory.display()))?;

        let single = serde_json::to_string_pretty(&StateFile::from(progress))?;
        fs::write(self.job_path(&progress.job_name), single)
            .context("Failed to write job state file")?;

        let all = collect_states(&self.directory)?;
        fs::write(self.aggregate_path(), serde_json::to_string_pretty(&all)?)
            .context("Failed to write aggregate state file")?;
        Ok(())
    }
}

fn collect_states(directory: &Path) -> Result<Vec<serde_json::Value>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(directory)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(STATE_SUFFIX))
        })
        .collect();
    paths.sort();

    let mut states = Vec::with_capacity(paths.len());
    for path in paths {
        let parsed = fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|content| Ok(serde_json::from_str(&content)?));
        match parsed {
            Ok(value) => states.push(value),
            Err(e) => debug!(path = %path.display(), error = %e, "Ignoring unreadable state file"),
        }
    }
    Ok(states)
}

#[async_trait]
impl StateSink for JsonStateWriter {
    async fn publish(&self, progress: BackupProgress) -> Result<()> {
        let writer = self.clone();
        tokio::task::spawn_blocking(move || writer.write(&progress)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_writes_job_and_aggregate_files() {
        let temp = tempdir().unwrap();
        let writer = JsonStateWriter::new(temp.path());

        let mut docs = BackupProgress::new("docs");
        docs.state = BackupState::Active;
        docs.total_files = 4;
        docs.remaining_files = 1;
        writer.publish(docs).await.unwrap();

        let mut photos = BackupProgress::new("photos");
        photos.state = BackupState::Completed;
        writer.publish(photos).await.unwrap();

        let single: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(writer.job_path("docs")).unwrap()).unwrap();
        assert_eq!(single["State"], "ACTIVE");
        assert_eq!(single["Progression"], 75);
        assert_eq!(single["SourceFilePath"], "");

        let all: Vec<serde_json::Value> =
            serde_json::from_str(&fs::read_to_string(writer.aggregate_path()).unwrap()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["Name"], "docs");
        assert_eq!(all[1]["State"], "COMPLETED");
    }
}
