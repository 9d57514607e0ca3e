use async_trait::async_trait;
use savejob::core::{
    BackupEngine, BackupError, BackupJob, BackupMode, BackupProgress, BackupState, EncryptError,
    Encryptor, MemoryLogSink, StateSink, StaticProbe,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;
use tempfile::{TempDir, tempdir};

/// Control request issued from inside the state sink, once, when the given
/// number of files has been handled.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Action {
    Stop,
    /// Pause, then resume shortly after the job reports `Paused`.
    Pause,
    /// Pause, then stop shortly after the job reports `Paused`.
    PauseThenStop,
}

#[derive(Default)]
struct Recorder {
    snapshots: Mutex<Vec<BackupProgress>>,
    engine: OnceLock<Weak<BackupEngine>>,
    trigger: Option<(u64, Action)>,
    fired: AtomicBool,
}

impl Recorder {
    fn with_trigger(handled: u64, action: Action) -> Self {
        Self {
            trigger: Some((handled, action)),
            ..Self::default()
        }
    }

    fn snapshots(&self) -> Vec<BackupProgress> {
        self.snapshots.lock().unwrap().clone()
    }

    fn states(&self) -> Vec<BackupState> {
        let mut states: Vec<BackupState> = Vec::new();
        for s in self.snapshots() {
            if states.last() != Some(&s.state) {
                states.push(s.state);
            }
        }
        states
    }

    fn engine(&self) -> Option<Arc<BackupEngine>> {
        self.engine.get().and_then(Weak::upgrade)
    }
}

#[async_trait]
impl StateSink for Recorder {
    async fn publish(&self, progress: BackupProgress) -> anyhow::Result<()> {
        self.snapshots.lock().unwrap().push(progress.clone());

        let Some(engine) = self.engine() else {
            return Ok(());
        };
        let Some((handled, action)) = self.trigger else {
            return Ok(());
        };

        let done = progress.total_files - progress.remaining_files;
        if progress.state == BackupState::Active
            && progress.total_files > 0
            && done == handled
            && !self.fired.swap(true, Ordering::SeqCst)
        {
            match action {
                Action::Stop => assert!(engine.stop(&progress.job_name)),
                Action::Pause | Action::PauseThenStop => {
                    assert!(engine.pause(&progress.job_name))
                }
            }
        }

        if progress.state == BackupState::Paused {
            let name = progress.job_name.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                if action == Action::PauseThenStop {
                    engine.stop(&name);
                } else {
                    engine.resume(&name);
                }
            });
        }

        Ok(())
    }
}

/// Pretends to encrypt by copying to `<name>.crypt`.
struct CopyingEncryptor;

#[async_trait]
impl Encryptor for CopyingEncryptor {
    async fn encrypt(&self, source: &Path, dest_dir: &Path) -> Result<u64, EncryptError> {
        let mut name = source.file_name().unwrap().to_owned();
        name.push(".crypt");
        fs::copy(source, dest_dir.join(name)).map_err(EncryptError::Spawn)?;
        Ok(7)
    }
}

struct Harness {
    _temp: TempDir,
    src: PathBuf,
    dst: PathBuf,
    log: MemoryLogSink,
    state: Arc<Recorder>,
    engine: Arc<BackupEngine>,
}

fn harness(files: &[(&str, usize)], recorder: Recorder, business_running: bool) -> Harness {
    let temp = tempdir().unwrap();
    let src = temp.path().join("src");
    let dst = temp.path().join("dst");
    fs::create_dir_all(&src).unwrap();
    for (name, size) in files {
        let path = src.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![b'x'; *size]).unwrap();
    }

    let log = MemoryLogSink::new();
    let state = Arc::new(recorder);
    let engine = Arc::new(
        BackupEngine::new(
            Arc::new(log.clone()),
            state.clone(),
            Arc::new(CopyingEncryptor),
            Arc::new(StaticProbe(business_running)),
        )
        .with_business_software(Some(PathBuf::from("/opt/erp/erp"))),
    );
    let _ = state.engine.set(Arc::downgrade(&engine));

    Harness {
        _temp: temp,
        src,
        dst,
        log,
        state,
        engine,
    }
}

impl Harness {
    fn job(&self, mode: BackupMode) -> BackupJob {
        BackupJob::new("job", &self.src, &self.dst, mode)
    }
}

#[tokio::test]
async fn test_full_backup_copies_everything() {
    let h = harness(&[("a.txt", 10), ("b.txt", 20)], Recorder::default(), false);

    let summary = h.engine.execute(&h.job(BackupMode::Full)).await.unwrap();

    assert_eq!(summary.state, BackupState::Completed);
    assert_eq!(summary.files_transferred, 2);
    assert_eq!(summary.progress.total_files, 2);
    assert_eq!(summary.progress.total_bytes, 30);
    assert_eq!(summary.progress.remaining_files, 0);
    assert_eq!(summary.progress.percentage(), 100);

    let records = h.log.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| !r.is_error() && r.transfer_time_ms >= 0));
    assert_eq!(fs::read(h.dst.join("b.txt")).unwrap(), vec![b'x'; 20]);

    let last = h.state.snapshots().pop().unwrap();
    assert_eq!(last.state, BackupState::Completed);
    assert_eq!(last.current_source, None);
    assert_eq!(h.state.states().first(), Some(&BackupState::Active));
}

#[tokio::test]
async fn test_failed_file_ends_in_error_after_processing_rest() {
    let h = harness(
        &[("a.txt", 10), ("b.txt", 20), ("c.txt", 1)],
        Recorder::default(),
        false,
    );
    // A directory where b.txt should land makes its copy fail.
    fs::create_dir_all(h.dst.join("b.txt")).unwrap();

    let summary = h.engine.execute(&h.job(BackupMode::Full)).await.unwrap();

    assert_eq!(summary.state, BackupState::Error);
    assert_eq!(summary.files_transferred, 2);
    assert_eq!(summary.files_failed, 1);
    assert_eq!(summary.progress.remaining_files, 0);

    let records = h.log.records();
    assert_eq!(records.len(), 3);
    let failed: Vec<_> = records.iter().filter(|r| r.is_error()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].transfer_time_ms, -1);
    assert_eq!(failed[0].source.as_deref(), Some(h.src.join("b.txt").as_path()));
    assert!(h.dst.join("c.txt").is_file());
}

#[tokio::test]
async fn test_differential_selects_only_changed_files() {
    let h = harness(&[("a.txt", 10), ("b.txt", 20)], Recorder::default(), false);
    h.engine.execute(&h.job(BackupMode::Full)).await.unwrap();
    fs::remove_file(h.dst.join("b.txt")).unwrap();

    let summary = h
        .engine
        .execute(&h.job(BackupMode::Differential))
        .await
        .unwrap();

    assert_eq!(summary.state, BackupState::Completed);
    assert_eq!(summary.progress.total_files, 1);
    assert_eq!(summary.progress.total_bytes, 20);

    let records = h.log.records();
    let last = records.last().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(last.source.as_deref(), Some(h.src.join("b.txt").as_path()));
    assert!(h.dst.join("b.txt").is_file());
}

#[tokio::test]
async fn test_business_software_blocks_start() {
    let h = harness(&[("a.txt", 1)], Recorder::default(), true);

    let err = h.engine.execute(&h.job(BackupMode::Full)).await.unwrap_err();

    assert!(matches!(err, BackupError::Interrupted { .. }));
    assert!(err.is_interrupted());
    assert!(!h.dst.exists());
    assert_eq!(h.state.states(), vec![BackupState::Interrupted]);

    let records = h.log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source, None);
    assert!(h.engine.active_jobs().is_empty());
}

#[tokio::test]
async fn test_stop_takes_effect_at_file_boundary() {
    let h = harness(
        &[("a.txt", 1), ("b.txt", 1), ("c.txt", 1)],
        Recorder::with_trigger(1, Action::Stop),
        false,
    );

    let summary = h.engine.execute(&h.job(BackupMode::Full)).await.unwrap();

    assert_eq!(summary.state, BackupState::Stopped);
    assert_eq!(summary.files_transferred, 1);
    assert_eq!(summary.progress.remaining_files, 2);
    assert_eq!(h.log.records().len(), 1);
    assert!(h.dst.join("a.txt").is_file());
    assert!(!h.dst.join("b.txt").exists());
}

#[tokio::test]
async fn test_pause_and_resume_finish_the_job() {
    let h = harness(
        &[("a.txt", 1), ("b.txt", 1), ("c.txt", 1)],
        Recorder::with_trigger(1, Action::Pause),
        false,
    );

    let summary = h.engine.execute(&h.job(BackupMode::Full)).await.unwrap();

    assert_eq!(summary.state, BackupState::Completed);
    assert_eq!(summary.files_transferred, 3);
    assert_eq!(
        h.state.states(),
        vec![
            BackupState::Active,
            BackupState::Paused,
            BackupState::Active,
            BackupState::Completed
        ]
    );
    for name in ["a.txt", "b.txt", "c.txt"] {
        assert!(h.dst.join(name).is_file());
    }
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ordered() {
    let h = harness(
        &[("a.txt", 5), ("b.txt", 15), ("c.txt", 30), ("d.txt", 50)],
        Recorder::default(),
        false,
    );

    h.engine.execute(&h.job(BackupMode::Full)).await.unwrap();

    let snapshots = h.state.snapshots();
    for (i, s) in snapshots.iter().enumerate() {
        assert_eq!(s.sequence, i as u64);
    }

    let counted: Vec<_> = snapshots.iter().filter(|s| s.total_files > 0).collect();
    for pair in counted.windows(2) {
        assert!(pair[1].remaining_bytes <= pair[0].remaining_bytes);
        assert!(pair[1].remaining_files <= pair[0].remaining_files);
        assert!(pair[1].percentage() >= pair[0].percentage());
    }

    let halfway = counted
        .iter()
        .find(|s| s.remaining_files == 2)
        .unwrap();
    assert_eq!(halfway.percentage(), 50);
    assert_eq!(halfway.remaining_bytes, 80);
}

#[tokio::test]
async fn test_missing_source_ends_in_error() {
    let h = harness(&[], Recorder::default(), false);
    let job = BackupJob::new("job", h.src.join("missing"), &h.dst, BackupMode::Full);

    let summary = h.engine.execute(&job).await.unwrap();

    assert_eq!(summary.state, BackupState::Error);
    assert_eq!(h.state.states(), vec![BackupState::Error]);
    assert!(!h.dst.exists());
    let records = h.log.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].message.starts_with("Job execution failed"));
    assert!(h.engine.active_jobs().is_empty());
}

#[tokio::test]
async fn test_empty_source_completes() {
    let h = harness(&[], Recorder::default(), false);

    let summary = h.engine.execute(&h.job(BackupMode::Full)).await.unwrap();

    assert_eq!(summary.state, BackupState::Completed);
    assert_eq!(summary.progress.total_files, 0);
    assert_eq!(summary.progress.percentage(), 0);
    assert!(h.log.records().is_empty());
}

#[tokio::test]
async fn test_priority_files_go_first_and_encryption_is_delegated() {
    let h = harness(
        &[("a.txt", 1), ("b.pdf", 1), ("c.txt", 1), ("d.pdf", 1)],
        Recorder::default(),
        false,
    );
    let job = h.job(BackupMode::Full).with_priority("pdf").with_encryption("txt");

    let summary = h.engine.execute(&job).await.unwrap();
    assert_eq!(summary.state, BackupState::Completed);

    let order: Vec<_> = h
        .log
        .records()
        .iter()
        .map(|r| {
            let source = r.source.clone().unwrap();
            source.file_name().unwrap().to_string_lossy().into_owned()
        })
        .collect();
    assert_eq!(order, ["b.pdf", "d.pdf", "a.txt", "c.txt"]);

    let encrypted: Vec<_> = h
        .log
        .records()
        .into_iter()
        .filter(|r| r.encryption_time_ms > 0)
        .collect();
    assert_eq!(encrypted.len(), 2);
    assert!(encrypted.iter().all(|r| r.encryption_time_ms == 7));
    assert_eq!(
        encrypted[0].target.as_deref(),
        Some(h.dst.join("a.txt.crypt").as_path())
    );
    assert!(h.dst.join("a.txt.crypt").is_file());
    assert!(!h.dst.join("a.txt").exists());
    assert!(h.dst.join("b.pdf").is_file());
}

#[tokio::test]
async fn test_invalid_job_is_rejected() {
    let h = harness(&[], Recorder::default(), false);
    let job = BackupJob::new("  ", &h.src, &h.dst, BackupMode::Full);

    let err = h.engine.execute(&job).await.unwrap_err();
    assert!(matches!(err, BackupError::InvalidJob(_)));
    assert!(h.state.snapshots().is_empty());
}

#[tokio::test]
async fn test_stop_while_paused_ends_stopped() {
    let h = harness(
        &[("a.txt", 1), ("b.txt", 1), ("c.txt", 1)],
        Recorder::with_trigger(1, Action::PauseThenStop),
        false,
    );

    let summary = h.engine.execute(&h.job(BackupMode::Full)).await.unwrap();

    assert_eq!(summary.state, BackupState::Stopped);
    assert_eq!(summary.files_transferred, 1);
    assert_eq!(summary.progress.remaining_files, 2);
    assert_eq!(
        h.state.states(),
        vec![BackupState::Active, BackupState::Paused, BackupState::Stopped]
    );
    assert_eq!(h.log.records().len(), 1);
    assert!(!h.dst.join("b.txt").exists());
    assert!(h.engine.active_jobs().is_empty());
}

/// Panics on the first snapshot it receives.
#[derive(Default)]
struct PanicOnce(AtomicBool);

#[async_trait]
impl StateSink for PanicOnce {
    async fn publish(&self, _progress: BackupProgress) -> anyhow::Result<()> {
        if !self.0.swap(true, Ordering::SeqCst) {
            panic!("state sink failure");
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_panicking_run_releases_job_name() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("a.txt"), b"a").unwrap();

    let engine = Arc::new(BackupEngine::new(
        Arc::new(MemoryLogSink::new()),
        Arc::new(PanicOnce::default()),
        Arc::new(CopyingEncryptor),
        Arc::new(StaticProbe(false)),
    ));
    let job = BackupJob::new("job", &src, temp.path().join("dst"), BackupMode::Full);

    let crashed = tokio::spawn({
        let engine = engine.clone();
        let job = job.clone();
        async move { engine.execute(&job).await }
    })
    .await;
    assert!(crashed.unwrap_err().is_panic());
    assert!(engine.active_jobs().is_empty());

    let summary = engine.execute(&job).await.unwrap();
    assert_eq!(summary.state, BackupState::Completed);
}
