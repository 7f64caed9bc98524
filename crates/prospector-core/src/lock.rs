//! Single-instance PID lockfile.
//!
//! At most one orchestrator may run per data directory: the in-memory
//! lifetime tally in the cost governor is only correct with a single
//! writer. A second instance observing a live lock exits with no side
//! effects. A lock left behind by a dead process is reclaimed.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use prospector_types::{PipelineError, Result};

/// Held for the lifetime of the orchestrator process; the file is
/// removed on drop.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
}

impl PidLock {
    /// Acquire the lock at `path`, reclaiming it if the recorded owner
    /// is no longer alive.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        for _ in 0..2 {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(file) => {
                    use std::io::Write;
                    let mut file = file;
                    write!(file, "{}", std::process::id())?;
                    info!(path = %path.display(), "orchestrator lock acquired");
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let holder = fs::read_to_string(path)
                        .ok()
                        .and_then(|s| s.trim().parse::<u32>().ok());
                    match holder {
                        Some(pid) if pid_alive(pid) => {
                            return Err(PipelineError::LockContended {
                                path: path.display().to_string(),
                            });
                        }
                        _ => {
                            warn!(path = %path.display(), "reclaiming stale lock");
                            let _ = fs::remove_file(path);
                            // Retry the create once.
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PipelineError::LockContended {
            path: path.display().to_string(),
        })
    }
}

/// Liveness probe for a recorded owner pid.
#[cfg(target_os = "linux")]
fn pid_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

/// Without a procfs, assume the holder is alive; a false positive only
/// costs an operator a manual unlock.
#[cfg(not(target_os = "linux"))]
fn pid_alive(_pid: u32) -> bool {
    true
}

impl Drop for PidLock {
    fn drop(&mut self) {
        // Only remove a lock that is still ours.
        let ours = fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .map(|pid| pid == std::process::id())
            .unwrap_or(false);
        if ours {
            let _ = fs::remove_file(&self.path);
        }
    }
}
