//! The SQLite relational store.
//!
//! Single-writer: every mutation serializes through one
//! `Mutex<Connection>`. WAL journal mode keeps concurrent read-only
//! connections (dashboard, backup verification) from blocking on the
//! writer.
//!
//! Append-only tables: `stage_runs`, `cost_entries`, and `audit_log`
//! expose no update or delete through this API. Correcting a prior row
//! means appending another one.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use prospector_types::{
    audit::AuditEvent, post::StageRun, AuditAction, PipelineError, Post, Stage, StageStatus,
};

/// Store-level errors.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database file or its parent directory is not usable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A stored value failed to decode (corrupt enum string, bad JSON).
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        PipelineError::Store(err.to_string())
    }
}

/// Result of an idempotent post insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The post was new and has been persisted.
    Inserted,
    /// A row with this id already existed; nothing was written.
    AlreadyPresent,
}

/// One model call's accounting, as written by the cost governor.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CostEntry {
    /// Orchestrator run this call belongs to.
    pub run_id: i64,
    /// Prompt tokens (actual, or conservative estimate on refusal rows).
    pub tokens_in: u64,
    /// Completion tokens.
    pub tokens_out: u64,
    /// Realized cost in USD. Zero on refusal rows.
    pub usd_cost: f64,
    /// Entry time, unix seconds UTC.
    pub timestamp: i64,
    /// Model the call targeted.
    pub model: String,
    /// Set when the entry records a refusal rather than an execution.
    pub abort_reason: Option<String>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    body TEXT,
    origin TEXT,
    author TEXT,
    score INTEGER NOT NULL DEFAULT 0,
    url TEXT,
    original_ts INTEGER NOT NULL,
    raw_json TEXT
);
CREATE INDEX IF NOT EXISTS idx_posts_original_ts ON posts(original_ts);

CREATE TABLE IF NOT EXISTS stage_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    status TEXT NOT NULL,
    artifact_path TEXT,
    error_message TEXT,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (post_id) REFERENCES posts(id)
);
CREATE INDEX IF NOT EXISTS idx_stage_runs_post_id ON stage_runs(post_id);
CREATE INDEX IF NOT EXISTS idx_stage_runs_status ON stage_runs(status);
CREATE INDEX IF NOT EXISTS idx_stage_runs_created_at ON stage_runs(created_at);

CREATE TABLE IF NOT EXISTS cost_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL,
    tokens_in INTEGER NOT NULL,
    tokens_out INTEGER NOT NULL,
    usd_cost REAL NOT NULL,
    timestamp INTEGER NOT NULL,
    model TEXT,
    abort_reason TEXT
);
CREATE INDEX IF NOT EXISTS idx_cost_entries_timestamp ON cost_entries(timestamp);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    action TEXT NOT NULL,
    post_id TEXT,
    run_id INTEGER,
    details TEXT,
    error_flag INTEGER NOT NULL DEFAULT 0,
    cost_exhausted_flag INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_audit_post_id ON audit_log(post_id);
CREATE INDEX IF NOT EXISTS idx_audit_action ON audit_log(action);
CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp DESC);
";

/// The writer handle to the relational store.
pub struct Store {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        // WAL keeps read-only dashboard connections off the writer's back.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute("PRAGMA synchronous = NORMAL", [])?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %path.display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// Path of the backing database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    // ── Posts ────────────────────────────────────────────────────────

    /// Idempotent insert keyed on `post.id`. A duplicate reports
    /// [`SaveOutcome::AlreadyPresent`] without touching the stored row.
    pub fn save_post(&self, post: &Post) -> Result<SaveOutcome, StoreError> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO posts (id, title, body, origin, author, score, url, original_ts, raw_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                post.id,
                post.title,
                post.body,
                post.origin,
                post.author,
                post.score,
                post.url,
                post.original_ts,
                post.raw_json,
            ],
        )?;
        Ok(if inserted == 1 {
            SaveOutcome::Inserted
        } else {
            SaveOutcome::AlreadyPresent
        })
    }

    /// Fetch one post by id.
    pub fn get_post(&self, post_id: &str) -> Result<Option<Post>, StoreError> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.query_row(
            "SELECT id, title, body, origin, author, score, url, original_ts, raw_json
             FROM posts WHERE id = ?1",
            params![post_id],
            row_to_post,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Posts with no terminal-success upload run, newest first.
    ///
    /// Anti-join keyed on `post_id` so the `stage_runs(post_id)` index
    /// drives the lookup.
    pub fn list_unprocessed_posts(&self) -> Result<Vec<Post>, StoreError> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT p.id, p.title, p.body, p.origin, p.author, p.score, p.url, p.original_ts, p.raw_json
             FROM posts p
             LEFT JOIN (
                 SELECT DISTINCT post_id FROM stage_runs
                 WHERE stage = 'upload' AND status = 'completed'
             ) done ON p.id = done.post_id
             WHERE done.post_id IS NULL
             ORDER BY p.original_ts DESC",
        )?;
        let posts = stmt
            .query_map([], row_to_post)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    // ── Stage runs + audit (one transaction) ─────────────────────────

    /// Append one stage run and its audit event atomically.
    ///
    /// Every stage transition goes through here so the audit trail is a
    /// superset of stage history by construction.
    #[allow(clippy::too_many_arguments)]
    pub fn record_stage(
        &self,
        post_id: &str,
        stage: Stage,
        status: StageStatus,
        artifact_path: Option<&Path>,
        error_message: Option<&str>,
        run_id: i64,
        action: AuditAction,
        details: serde_json::Value,
    ) -> Result<(), StoreError> {
        let now = Self::now();
        let mut conn = self.conn.lock().expect("store lock poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO stage_runs (post_id, stage, status, artifact_path, error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                post_id,
                stage.as_str(),
                status.as_str(),
                artifact_path.map(|p| p.to_string_lossy().into_owned()),
                error_message,
                now,
            ],
        )?;
        tx.execute(
            "INSERT INTO audit_log (timestamp, action, post_id, run_id, details, error_flag, cost_exhausted_flag)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                now,
                action.as_str(),
                post_id,
                run_id,
                details.to_string(),
                matches!(status, StageStatus::Failed) as i64,
                matches!(status, StageStatus::CostExhausted) as i64,
            ],
        )?;
        tx.commit()?;

        debug!(post_id, stage = %stage, status = %status, "stage recorded");
        Ok(())
    }

    /// All stage runs for a post, oldest first.
    pub fn stage_runs_for_post(&self, post_id: &str) -> Result<Vec<StageRun>, StoreError> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, post_id, stage, status, artifact_path, error_message, created_at
             FROM stage_runs WHERE post_id = ?1 ORDER BY id ASC",
        )?;
        let runs = stmt
            .query_map(params![post_id], row_to_stage_run)?
            .collect::<Result<Vec<_>, _>>()?;
        runs.into_iter().collect()
    }

    // ── Cost entries ─────────────────────────────────────────────────

    /// Append one cost entry.
    pub fn append_cost_entry(&self, entry: &CostEntry) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "INSERT INTO cost_entries (run_id, tokens_in, tokens_out, usd_cost, timestamp, model, abort_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.run_id,
                entry.tokens_in,
                entry.tokens_out,
                entry.usd_cost,
                entry.timestamp,
                entry.model,
                entry.abort_reason,
            ],
        )?;
        Ok(())
    }

    /// Exact lifetime spend: the sum over executed entries only.
    /// Refusal rows (`abort_reason` set) are bookkeeping, not spend.
    pub fn lifetime_spend(&self) -> Result<f64, StoreError> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(usd_cost), 0.0) FROM cost_entries WHERE abort_reason IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    // ── Audit ────────────────────────────────────────────────────────

    /// Append one audit event outside a stage transition (ingestions,
    /// refusals, discards).
    pub fn append_audit(
        &self,
        action: AuditAction,
        post_id: Option<&str>,
        run_id: Option<i64>,
        details: serde_json::Value,
        error_flag: bool,
        cost_exhausted_flag: bool,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "INSERT INTO audit_log (timestamp, action, post_id, run_id, details, error_flag, cost_exhausted_flag)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Self::now(),
                action.as_str(),
                post_id,
                run_id,
                details.to_string(),
                error_flag as i64,
                cost_exhausted_flag as i64,
            ],
        )?;
        Ok(())
    }

    /// Full audit history for one post, insertion order.
    pub fn post_history(&self, post_id: &str) -> Result<Vec<AuditEvent>, StoreError> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, action, post_id, run_id, details, error_flag, cost_exhausted_flag
             FROM audit_log WHERE post_id = ?1 ORDER BY id ASC",
        )?;
        let events = stmt
            .query_map(params![post_id], row_to_audit_event)?
            .collect::<Result<Vec<_>, _>>()?;
        events.into_iter().collect()
    }

    /// Recent error and refusal events, newest first.
    pub fn recent_errors(&self, limit: usize) -> Result<Vec<AuditEvent>, StoreError> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, action, post_id, run_id, details, error_flag, cost_exhausted_flag
             FROM audit_log
             WHERE error_flag = 1 OR cost_exhausted_flag = 1
             ORDER BY id DESC LIMIT ?1",
        )?;
        let events = stmt
            .query_map(params![limit as i64], row_to_audit_event)?
            .collect::<Result<Vec<_>, _>>()?;
        events.into_iter().collect()
    }

    /// Run a closure while holding the writer lock. Used by the backup
    /// manager to take a consistent snapshot with no writer activity.
    pub fn with_writer_paused<R>(&self, f: impl FnOnce(&Connection) -> R) -> R {
        let conn = self.conn.lock().expect("store lock poisoned");
        f(&conn)
    }
}

fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        origin: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        author: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        score: row.get(5)?,
        url: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        original_ts: row.get(7)?,
        raw_json: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
    })
}

fn row_to_stage_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<StageRun, StoreError>> {
    let stage_raw: String = row.get(2)?;
    let status_raw: String = row.get(3)?;
    Ok((|| {
        Ok(StageRun {
            id: row.get(0)?,
            post_id: row.get(1)?,
            stage: Stage::from_str(&stage_raw).map_err(StoreError::Corrupt)?,
            status: StageStatus::from_str(&status_raw).map_err(StoreError::Corrupt)?,
            artifact_path: row.get(4)?,
            error_message: row.get(5)?,
            created_at: row.get(6)?,
        })
    })())
}

fn row_to_audit_event(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<AuditEvent, StoreError>> {
    let action_raw: String = row.get(2)?;
    let details_raw: Option<String> = row.get(5)?;
    Ok((|| {
        Ok(AuditEvent {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            action: AuditAction::from_str(&action_raw).map_err(StoreError::Corrupt)?,
            post_id: row.get(3)?,
            run_id: row.get(4)?,
            details: details_raw
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| StoreError::Corrupt(format!("details json: {e}")))?
                .unwrap_or(serde_json::Value::Null),
            error_flag: row.get::<_, i64>(6)? != 0,
            cost_exhausted_flag: row.get::<_, i64>(7)? != 0,
        })
    })())
}
