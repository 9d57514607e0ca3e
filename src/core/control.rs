//! Pause/resume/stop signaling for in-flight jobs.
//!
//! A [`JobControl`] lives exactly as long as one execution of a job. The
//! [`JobControls`] table maps job names to their live control and is the only
//! structure shared between job workers and the controlling caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// How a wait at the pause gate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Resumed,
    Stopped,
}

/// Cancellation flag plus pause gate for one running job.
///
/// All requests are idempotent.
#[derive(Clone)]
pub struct JobControl {
    cancel: CancellationToken,
    paused: Arc<watch::Sender<bool>>,
}

impl Default for JobControl {
    fn default() -> Self {
        Self::new()
    }
}

impl JobControl {
    /// A fresh control with the gate open.
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            paused: Arc::new(paused),
        }
    }

    pub fn request_pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn request_resume(&self) {
        self.paused.send_replace(false);
    }

    /// Stop the job at its next checkpoint. Wakes a job waiting at the pause gate.
    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Block until the gate opens or a stop is requested. Cancellation wins
    /// when both happen.
    pub async fn wait_while_paused(&self) -> GateOutcome {
        let mut rx = self.paused.subscribe();
        loop {
            if self.cancel.is_cancelled() {
                return GateOutcome::Stopped;
            }
            if !*rx.borrow_and_update() {
                return GateOutcome::Resumed;
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return GateOutcome::Stopped,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return GateOutcome::Resumed;
                    }
                }
            }
        }
    }
}

/// Live controls keyed by job name.
#[derive(Clone, Default)]
pub struct JobControls {
    inner: Arc<Mutex<HashMap<String, JobControl>>>,
}

impl JobControls {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, JobControl>> {
        // The map holds no invariants a panicking holder could break.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a fresh control for `name`, or `None` if one is already live.
    pub fn acquire(&self, name: &str) -> Option<JobControl> {
        let mut map = self.lock();
        if map.contains_key(name) {
            return None;
        }
        let control = JobControl::new();
        map.insert(name.to_string(), control.clone());
        Some(control)
    }

    /// Like [`acquire`](Self::acquire), but the name is released when the
    /// returned lease is dropped, including on panic or task abort.
    pub fn lease(&self, name: &str) -> Option<ControlLease<'_>> {
        let control = self.acquire(name)?;
        Some(ControlLease {
            controls: self,
            name: name.to_string(),
            control,
        })
    }

    pub fn get(&self, name: &str) -> Option<JobControl> {
        self.lock().get(name).cloned()
    }

    pub fn release(&self, name: &str) {
        self.lock().remove(name);
    }

    /// Returns false when no job of that name is running.
    pub fn pause(&self, name: &str) -> bool {
        self.get(name).map(|c| c.request_pause()).is_some()
    }

    pub fn resume(&self, name: &str) -> bool {
        self.get(name).map(|c| c.request_resume()).is_some()
    }

    pub fn stop(&self, name: &str) -> bool {
        self.get(name).map(|c| c.request_stop()).is_some()
    }

    pub fn stop_all(&self) {
        for control in self.lock().values() {
            control.request_stop();
        }
    }

    pub fn active_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

/// A live control that unregisters its job name on drop.
pub struct ControlLease<'a> {
    controls: &'a JobControls,
    name: String,
    control: JobControl,
}

impl ControlLease<'_> {
    pub fn control(&self) -> &JobControl {
        &self.control
    }
}

impl Drop for ControlLease<'_> {
    fn drop(&mut self) {
        self.controls.release(&self.name);
    }
}
