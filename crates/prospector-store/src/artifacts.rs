//! The write-once on-disk artifact tree.
//!
//! Layout under the artifacts root:
//!
//! ```text
//! <root>/<post_id>/<stage>_<unix_ts>.<ext>      stage outputs
//! <root>/<post_id>/verify_attempt_<n>.json      verification verdicts
//! <root>/<post_id>/error_logs/<stage>_<ts>.json error sidecars
//! <root>/abort_<run_id>.json                    run-level abort record
//! ```
//!
//! Files are written once and never rewritten; a name collision (two
//! writes of the same stage within one second) picks the next free
//! suffixed name instead of truncating the existing file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use prospector_types::{PipelineError, Result, Stage};

/// Handle to the artifact tree root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create the handle, ensuring the root directory exists.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// The artifact tree root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write one stage output for a post. Returns the created path.
    pub fn write_stage(&self, post_id: &str, stage: Stage, body: &str) -> Result<PathBuf> {
        let dir = self.root.join(post_id);
        fs::create_dir_all(&dir)?;
        let ts = chrono::Utc::now().timestamp();
        let path = next_free_path(&dir, stage.as_str(), ts, stage.artifact_ext());
        write_once(&path, body.as_bytes())?;
        debug!(post_id, stage = %stage, path = %path.display(), "artifact written");
        Ok(path)
    }

    /// Write one verification verdict, numbered by attempt (1-based).
    pub fn write_verify_attempt(
        &self,
        post_id: &str,
        attempt: u32,
        body: &str,
    ) -> Result<PathBuf> {
        let dir = self.root.join(post_id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("verify_attempt_{attempt}.json"));
        write_once(&path, body.as_bytes())?;
        Ok(path)
    }

    /// Write an error sidecar for a failed stage attempt.
    pub fn write_error(
        &self,
        post_id: &str,
        stage: Stage,
        payload: &serde_json::Value,
    ) -> Result<PathBuf> {
        let dir = self.root.join(post_id).join("error_logs");
        fs::create_dir_all(&dir)?;
        let ts = chrono::Utc::now().timestamp();
        let path = next_free_path(&dir, stage.as_str(), ts, "json");
        write_once(&path, serde_json::to_string_pretty(payload)?.as_bytes())?;
        restrict_permissions(&path);
        Ok(path)
    }

    /// Write the run-level abort record after a cost refusal.
    pub fn write_abort(&self, run_id: i64, payload: &serde_json::Value) -> Result<PathBuf> {
        let path = self.root.join(format!("abort_{run_id}.json"));
        write_once(&path, serde_json::to_string_pretty(payload)?.as_bytes())?;
        Ok(path)
    }
}

/// First non-existing `<stem>_<ts>[_<n>].<ext>` under `dir`.
fn next_free_path(dir: &Path, stem: &str, ts: i64, ext: &str) -> PathBuf {
    let base = dir.join(format!("{stem}_{ts}.{ext}"));
    if !base.exists() {
        return base;
    }
    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{stem}_{ts}_{n}.{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Create and write a file that must not already exist.
fn write_once(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            PipelineError::Io(std::io::Error::new(
                e.kind(),
                format!("artifact {} exists or is unwritable: {e}", path.display()),
            ))
        })?;
    file.write_all(bytes)?;
    Ok(())
}

/// Owner read/write only; error sidecars can carry request payloads.
fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    let _ = path;
}
