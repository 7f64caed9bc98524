//! Read-only projections for the dashboard.
//!
//! [`ReadStore`] opens its own connection with
//! `SQLITE_OPEN_READ_ONLY`, so a misbehaving reader cannot mutate the
//! database and never blocks the single writer (WAL snapshot reads).

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;

use prospector_types::AuditAction;

use crate::store::StoreError;

/// Spend/token/status summary over a trailing window.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// Exact lifetime spend (refusal rows excluded).
    pub lifetime_spend: f64,
    /// Spend over the window (refusal rows excluded).
    pub window_spend: f64,
    /// Prompt tokens over the window.
    pub tokens_in: u64,
    /// Completion tokens over the window.
    pub tokens_out: u64,
    /// Executed model calls over the window.
    pub calls: u64,
    /// Terminal stage-run counts over the window, keyed by status.
    pub completed: u64,
    pub discarded: u64,
    pub rejected: u64,
    pub hard_discarded: u64,
    pub failed: u64,
    pub cost_exhausted: u64,
    /// Projection of the newest run, when one is in progress.
    pub current_run: Option<RunProjection>,
}

/// Token and spend totals for one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct RunProjection {
    pub run_id: i64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
}

/// One audit event shaped for the activity feed.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRow {
    /// ISO 8601 UTC event time.
    pub timestamp: String,
    pub action: AuditAction,
    pub post_id: Option<String>,
    pub details: serde_json::Value,
    pub error: bool,
    pub cost_exhausted: bool,
}

/// A post whose most recent stage run is a non-terminal success.
#[derive(Debug, Clone, Serialize)]
pub struct InFlightPost {
    pub id: String,
    pub title: String,
    pub origin: String,
    pub score: i64,
    pub stage: String,
    /// ISO 8601 UTC time of the latest stage run.
    pub last_activity: String,
}

/// Read-only handle to the store.
pub struct ReadStore {
    conn: Mutex<Connection>,
}

impl ReadStore {
    /// Open the database read-only. Fails if the file does not exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Summary over the trailing `hours` window.
    pub fn stats(&self, hours: i64, run_in_progress: bool) -> Result<StatsSnapshot, StoreError> {
        let cutoff = chrono::Utc::now().timestamp() - hours * 3600;
        let conn = self.conn.lock().expect("read store lock poisoned");

        let lifetime_spend: f64 = conn.query_row(
            "SELECT COALESCE(SUM(usd_cost), 0.0) FROM cost_entries WHERE abort_reason IS NULL",
            [],
            |row| row.get(0),
        )?;

        let (window_spend, tokens_in, tokens_out, calls): (f64, i64, i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(usd_cost), 0.0),
                    COALESCE(SUM(tokens_in), 0),
                    COALESCE(SUM(tokens_out), 0),
                    COUNT(*)
             FROM cost_entries WHERE abort_reason IS NULL AND timestamp > ?1",
            params![cutoff],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        let status_count = |status: &str| -> Result<i64, rusqlite::Error> {
            conn.query_row(
                "SELECT COUNT(*) FROM stage_runs WHERE status = ?1 AND created_at > ?2",
                params![status, cutoff],
                |row| row.get(0),
            )
        };

        let completed = conn.query_row(
            "SELECT COUNT(*) FROM stage_runs
             WHERE stage = 'upload' AND status = 'completed' AND created_at > ?1",
            params![cutoff],
            |row| row.get::<_, i64>(0),
        )?;

        let current_run = if run_in_progress {
            conn.query_row(
                "SELECT run_id,
                        COALESCE(SUM(tokens_in), 0),
                        COALESCE(SUM(tokens_out), 0),
                        COALESCE(SUM(usd_cost), 0.0)
                 FROM cost_entries
                 WHERE abort_reason IS NULL
                   AND run_id = (SELECT MAX(run_id) FROM cost_entries)
                 GROUP BY run_id",
                [],
                |row| {
                    Ok(RunProjection {
                        run_id: row.get(0)?,
                        tokens_in: row.get::<_, i64>(1)? as u64,
                        tokens_out: row.get::<_, i64>(2)? as u64,
                        cost_usd: row.get(3)?,
                    })
                },
            )
            .ok()
        } else {
            None
        };

        Ok(StatsSnapshot {
            lifetime_spend,
            window_spend,
            tokens_in: tokens_in as u64,
            tokens_out: tokens_out as u64,
            calls: calls as u64,
            completed: completed as u64,
            discarded: status_count("discarded")? as u64,
            rejected: status_count("rejected")? as u64,
            hard_discarded: status_count("hard_discard")? as u64,
            failed: status_count("failed")? as u64,
            cost_exhausted: status_count("cost_exhausted")? as u64,
            current_run,
        })
    }

    /// Last `limit` audit events, newest first.
    pub fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityRow>, StoreError> {
        let conn = self.conn.lock().expect("read store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT timestamp, action, post_id, details, error_flag, cost_exhausted_flag
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let ts: i64 = row.get(0)?;
            let action_raw: String = row.get(1)?;
            let details_raw: Option<String> = row.get(3)?;
            Ok((
                ts,
                action_raw,
                row.get::<_, Option<String>>(2)?,
                details_raw,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut activity = Vec::new();
        for row in rows {
            let (ts, action_raw, post_id, details_raw, error, exhausted) = row?;
            let action = AuditAction::from_str(&action_raw).map_err(StoreError::Corrupt)?;
            activity.push(ActivityRow {
                timestamp: iso_utc(ts),
                action,
                post_id,
                details: details_raw
                    .as_deref()
                    .and_then(|d| serde_json::from_str(d).ok())
                    .unwrap_or(serde_json::Value::Null),
                error: error != 0,
                cost_exhausted: exhausted != 0,
            });
        }
        Ok(activity)
    }

    /// Posts whose latest stage run is a completed non-upload stage:
    /// work has started but no terminal outcome exists yet. At most one
    /// during a run in the all-sequential design.
    pub fn posts_in_flight(&self) -> Result<Vec<InFlightPost>, StoreError> {
        let conn = self.conn.lock().expect("read store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT p.id, p.title, p.origin, p.score, sr.stage, sr.created_at
             FROM posts p
             JOIN stage_runs sr ON sr.post_id = p.id
             WHERE sr.id = (SELECT MAX(id) FROM stage_runs WHERE post_id = p.id)
               AND sr.status = 'completed'
               AND sr.stage != 'upload'
             ORDER BY sr.created_at DESC",
        )?;
        let posts = stmt
            .query_map([], |row| {
                Ok(InFlightPost {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    origin: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    score: row.get(3)?,
                    stage: row.get(4)?,
                    last_activity: iso_utc(row.get(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }
}

/// Render unix seconds as an ISO 8601 UTC string.
fn iso_utc(ts: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CostEntry, Store};
    use prospector_types::{Post, Stage, StageStatus};
    use tempfile::TempDir;

    fn seeded() -> (TempDir, Store, ReadStore) {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("pipeline.db");
        let store = Store::open(&db).unwrap();
        let read = ReadStore::open(&db).unwrap();
        (dir, store, read)
    }

    fn post(id: &str) -> Post {
        Post {
            id: id.into(),
            title: "t".into(),
            body: String::new(),
            origin: "startups".into(),
            author: "a".into(),
            score: 12,
            url: String::new(),
            original_ts: 100,
            raw_json: String::new(),
        }
    }

    fn entry(run_id: i64, cost: f64, ts: i64, abort: Option<&str>) -> CostEntry {
        CostEntry {
            run_id,
            tokens_in: 100,
            tokens_out: 40,
            usd_cost: cost,
            timestamp: ts,
            model: "m".into(),
            abort_reason: abort.map(String::from),
        }
    }

    #[test]
    fn stats_window_and_lifetime_split() {
        let (_dir, store, read) = seeded();
        let now = chrono::Utc::now().timestamp();

        // Recent executed, old executed, recent refusal.
        store.append_cost_entry(&entry(1, 1.0, now - 60, None)).unwrap();
        store
            .append_cost_entry(&entry(1, 2.0, now - 48 * 3600, None))
            .unwrap();
        store
            .append_cost_entry(&entry(1, 0.0, now - 30, Some("per_run_usd")))
            .unwrap();

        let stats = read.stats(24, false).unwrap();
        assert!((stats.lifetime_spend - 3.0).abs() < 1e-9);
        assert!((stats.window_spend - 1.0).abs() < 1e-9);
        assert_eq!(stats.calls, 1);
        assert!(stats.current_run.is_none());
    }

    #[test]
    fn stats_current_run_projection() {
        let (_dir, store, read) = seeded();
        let now = chrono::Utc::now().timestamp();
        store.append_cost_entry(&entry(41, 0.5, now, None)).unwrap();
        store.append_cost_entry(&entry(42, 0.25, now, None)).unwrap();
        store.append_cost_entry(&entry(42, 0.25, now, None)).unwrap();

        let stats = read.stats(24, true).unwrap();
        let run = stats.current_run.unwrap();
        assert_eq!(run.run_id, 42);
        assert!((run.cost_usd - 0.5).abs() < 1e-9);
        assert_eq!(run.tokens_in, 200);
    }

    #[test]
    fn recent_activity_newest_first() {
        let (_dir, store, read) = seeded();
        store
            .append_audit(
                AuditAction::PostIngested,
                Some("p1"),
                Some(1),
                serde_json::json!({"origin": "startups"}),
                false,
                false,
            )
            .unwrap();
        store
            .append_audit(
                AuditAction::ProblemExtracted,
                Some("p1"),
                Some(1),
                serde_json::json!({}),
                false,
                false,
            )
            .unwrap();

        let activity = read.recent_activity(10).unwrap();
        assert_eq!(activity.len(), 2);
        assert_eq!(activity[0].action, AuditAction::ProblemExtracted);
        assert_eq!(activity[1].action, AuditAction::PostIngested);
        assert_eq!(activity[1].details["origin"], "startups");
        // RFC 3339 Zulu timestamps.
        assert!(activity[0].timestamp.ends_with('Z'));
    }

    #[test]
    fn in_flight_tracks_latest_non_terminal() {
        let (_dir, store, read) = seeded();
        store.save_post(&post("p1")).unwrap();
        store.save_post(&post("p2")).unwrap();

        // p1 mid-pipeline, p2 terminally discarded.
        store
            .record_stage(
                "p1",
                Stage::Spec,
                StageStatus::Completed,
                None,
                None,
                1,
                AuditAction::SpecGenerated,
                serde_json::json!({}),
            )
            .unwrap();
        store
            .record_stage(
                "p2",
                Stage::Problem,
                StageStatus::Discarded,
                None,
                None,
                1,
                AuditAction::PostDiscarded,
                serde_json::json!({}),
            )
            .unwrap();

        let in_flight = read.posts_in_flight().unwrap();
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight[0].id, "p1");
        assert_eq!(in_flight[0].stage, "spec");
    }

    #[test]
    fn in_flight_empty_after_upload() {
        let (_dir, store, read) = seeded();
        store.save_post(&post("p1")).unwrap();
        store
            .record_stage(
                "p1",
                Stage::Upload,
                StageStatus::Completed,
                None,
                None,
                1,
                AuditAction::UploadSucceeded,
                serde_json::json!({}),
            )
            .unwrap();

        assert!(read.posts_in_flight().unwrap().is_empty());
    }

    #[test]
    fn read_store_cannot_write() {
        let (_dir, _store, read) = seeded();
        let conn = read.conn.lock().unwrap();
        let result = conn.execute("DELETE FROM audit_log", []);
        assert!(result.is_err(), "read-only connection must refuse writes");
    }
}
