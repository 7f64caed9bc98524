//! Database snapshots with tiered retention and verified restore.
//!
//! A snapshot is a consistent copy of the database taken while the
//! writer is paused (`VACUUM INTO` a staging file under the writer
//! lock), gzip-compressed into `<artifacts_root>/backups/<ts>.db.gz`
//! with owner-only permissions.
//!
//! Retention keeps the newest snapshot per calendar day for 7 days,
//! per ISO week for 4 weeks, and per calendar month for 12 months; a
//! file kept by any tier survives. Cleanup runs after every snapshot.

use std::collections::HashSet;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDateTime};
use flate2::read::GzDecoder;
use flate2::{write::GzEncoder, Compression};
use tracing::{info, warn};

use prospector_types::{PipelineError, Result};

use crate::store::Store;

/// Filename timestamp format; colons are not filesystem-safe.
const TS_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Manages the snapshot directory for one database.
#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_dir: PathBuf,
}

/// Summary of the snapshot directory.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackupStatus {
    pub backup_dir: String,
    pub count: usize,
    pub total_bytes: u64,
    /// ISO timestamp of the newest snapshot, when any exist.
    pub newest: Option<String>,
}

impl BackupManager {
    /// Create a manager writing into `backup_dir`.
    pub fn new(backup_dir: &Path) -> Self {
        Self {
            backup_dir: backup_dir.to_path_buf(),
        }
    }

    /// Take one snapshot and apply retention. Returns the snapshot path.
    pub fn snapshot(&self, store: &Store) -> Result<PathBuf> {
        fs::create_dir_all(&self.backup_dir)?;

        let stamp = chrono::Utc::now().format(TS_FORMAT).to_string();
        let staging = self.backup_dir.join(format!(".staging-{stamp}.db"));
        let target = self.backup_dir.join(format!("{stamp}.db.gz"));

        // Consistent copy: VACUUM INTO runs on the writer's connection
        // while the lock is held, so no write can interleave.
        let vacuum = store.with_writer_paused(|conn| {
            conn.execute("VACUUM INTO ?1", [staging.to_string_lossy().into_owned()])
        });
        vacuum.map_err(|e| PipelineError::Store(format!("snapshot vacuum failed: {e}")))?;

        let result = compress_file(&staging, &target);
        let _ = fs::remove_file(&staging);
        result?;

        restrict_permissions(&target);
        info!(path = %target.display(), "database snapshot written");

        let deleted = self.apply_retention()?;
        if deleted > 0 {
            info!(deleted, "retention removed expired snapshots");
        }

        Ok(target)
    }

    /// List snapshot files, newest first.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }
        let mut snapshots: Vec<(NaiveDateTime, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            if let Some(ts) = parse_snapshot_time(&path) {
                snapshots.push((ts, path));
            }
        }
        snapshots.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(snapshots.into_iter().map(|(_, p)| p).collect())
    }

    /// Delete snapshots no tier wants to keep. Returns how many.
    pub fn apply_retention(&self) -> Result<usize> {
        let mut snapshots: Vec<(NaiveDateTime, PathBuf)> = Vec::new();
        for path in self.list()? {
            if let Some(ts) = parse_snapshot_time(&path) {
                snapshots.push((ts, path));
            }
        }
        // list() is newest-first already; retention scans in that order.

        let mut keep: HashSet<PathBuf> = HashSet::new();
        let mut days_seen: Vec<chrono::NaiveDate> = Vec::new();
        let mut weeks_seen: Vec<(i32, u32)> = Vec::new();
        let mut months_seen: Vec<(i32, u32)> = Vec::new();

        for (ts, path) in &snapshots {
            let day = ts.date();
            if !days_seen.contains(&day) && days_seen.len() < 7 {
                days_seen.push(day);
                keep.insert(path.clone());
            }

            let week = (ts.iso_week().year(), ts.iso_week().week());
            if !weeks_seen.contains(&week) && weeks_seen.len() < 4 {
                weeks_seen.push(week);
                keep.insert(path.clone());
            }

            let month = (ts.year(), ts.month());
            if !months_seen.contains(&month) && months_seen.len() < 12 {
                months_seen.push(month);
                keep.insert(path.clone());
            }
        }

        let mut deleted = 0;
        for (_, path) in snapshots {
            if !keep.contains(&path) {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "failed to delete expired snapshot");
                } else {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    /// Restore `snapshot` over `db_path` after verifying it.
    ///
    /// The current database is copied aside to `<db>.recovery` before
    /// the verified staging file is atomically renamed into place.
    pub fn restore(&self, snapshot: &Path, db_path: &Path) -> Result<()> {
        if !snapshot.exists() {
            return Err(PipelineError::Store(format!(
                "snapshot not found: {}",
                snapshot.display()
            )));
        }

        let staging = db_path.with_extension("db.restore-staging");
        decompress_file(snapshot, &staging)?;

        if let Err(e) = verify_database(&staging) {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }

        if db_path.exists() {
            let recovery = db_path.with_extension("db.recovery");
            fs::copy(db_path, &recovery)?;
        }
        fs::rename(&staging, db_path)?;
        restrict_permissions(db_path);

        info!(snapshot = %snapshot.display(), "database restored");
        Ok(())
    }

    /// Directory summary.
    pub fn status(&self) -> Result<BackupStatus> {
        let snapshots = self.list()?;
        let total_bytes = snapshots
            .iter()
            .filter_map(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();
        let newest = snapshots
            .first()
            .and_then(|p| parse_snapshot_time(p))
            .map(|ts| ts.format(TS_FORMAT).to_string());
        Ok(BackupStatus {
            backup_dir: self.backup_dir.display().to_string(),
            count: snapshots.len(),
            total_bytes,
            newest,
        })
    }
}

/// Parse `<ts>.db.gz` back into its timestamp; non-snapshot files yield
/// `None` and are never touched by retention.
fn parse_snapshot_time(path: &Path) -> Option<NaiveDateTime> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(".db.gz")?;
    NaiveDateTime::parse_from_str(stem, TS_FORMAT).ok()
}

fn compress_file(src: &Path, dst: &Path) -> Result<()> {
    let bytes = fs::read(src)?;
    let file = fs::File::create(dst)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(&bytes)?;
    encoder.finish()?;
    Ok(())
}

fn decompress_file(src: &Path, dst: &Path) -> Result<()> {
    let file = fs::File::open(src)?;
    let mut decoder = GzDecoder::new(file);
    let mut bytes = Vec::new();
    decoder.read_to_end(&mut bytes)?;
    fs::write(dst, bytes)?;
    Ok(())
}

/// Header check plus `PRAGMA integrity_check`.
fn verify_database(path: &Path) -> Result<()> {
    let mut header = [0u8; 16];
    {
        let mut file = fs::File::open(path)?;
        file.read_exact(&mut header)
            .map_err(|_| PipelineError::Store("snapshot too short to be a database".into()))?;
    }
    if &header != SQLITE_HEADER {
        return Err(PipelineError::Store(
            "snapshot is not a SQLite database".into(),
        ));
    }

    let conn = rusqlite::Connection::open_with_flags(
        path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )
    .map_err(|e| PipelineError::Store(format!("cannot open snapshot: {e}")))?;
    let check: String = conn
        .query_row("PRAGMA integrity_check", [], |row| row.get(0))
        .map_err(|e| PipelineError::Store(format!("integrity check failed: {e}")))?;
    if !check.eq_ignore_ascii_case("ok") {
        return Err(PipelineError::Store(format!(
            "snapshot failed integrity check: {check}"
        )));
    }
    Ok(())
}

fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    let _ = path;
}
