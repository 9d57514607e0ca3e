//! Detection of a running business application.

use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Answers whether a process is running from a given executable path.
pub trait ProcessProbe: Send + Sync {
    fn is_running(&self, executable: &Path) -> bool;
}

/// Scans `/proc/<pid>/exe` links. Processes that exit mid-scan or deny access
/// are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcfsProbe;

impl ProcessProbe for ProcfsProbe {
    fn is_running(&self, executable: &Path) -> bool {
        let wanted = match normalize(executable) {
            Some(path) => path,
            None => return false,
        };

        let entries = match fs::read_dir("/proc") {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Cannot list processes");
                return false;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(pid) = name.to_str().filter(|n| n.bytes().all(|b| b.is_ascii_digit()))
            else {
                continue;
            };

            match fs::read_link(entry.path().join("exe")) {
                Ok(exe) => {
                    if normalize(&exe).is_some_and(|exe| paths_match(&exe, &wanted)) {
                        debug!(pid, executable = %exe.display(), "Blocking process found");
                        return true;
                    }
                }
                Err(e) => debug!(pid, error = %e, "Skipping unreadable process"),
            }
        }

        false
    }
}

/// Answers from a fixed value.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticProbe(pub bool);

impl ProcessProbe for StaticProbe {
    fn is_running(&self, _executable: &Path) -> bool {
        self.0
    }
}

/// Absolute, lexically cleaned path. Empty paths normalize to nothing.
fn normalize(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    Some(cleaned)
}

fn paths_match(a: &Path, b: &Path) -> bool {
    a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
}
