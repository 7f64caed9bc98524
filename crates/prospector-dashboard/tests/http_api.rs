//! HTTP tests for the dashboard endpoints: envelope shape, read-only
//! projections, and the in-flight view.

use std::sync::Arc;

use tempfile::TempDir;

use prospector_dashboard::{build_router, DashboardState};
use prospector_store::{CostEntry, Store};
use prospector_types::{AuditAction, Post, Stage, StageStatus};

async fn spawn_server(state: DashboardState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

fn seed_store(dir: &TempDir) -> Arc<Store> {
    let store = Arc::new(Store::open(&dir.path().join("pipeline.db")).unwrap());
    store
        .save_post(&Post {
            id: "p1".into(),
            title: "stuck on invoices".into(),
            body: "body".into(),
            origin: "startups".into(),
            author: "a".into(),
            score: 40,
            url: String::new(),
            original_ts: 100,
            raw_json: String::new(),
        })
        .unwrap();
    store
        .append_cost_entry(&CostEntry {
            run_id: 7,
            tokens_in: 1000,
            tokens_out: 500,
            usd_cost: 1.5,
            timestamp: now(),
            model: "m".into(),
            abort_reason: None,
        })
        .unwrap();
    store
        .append_audit(
            AuditAction::PostIngested,
            Some("p1"),
            Some(7),
            serde_json::json!({"origin": "startups"}),
            false,
            false,
        )
        .unwrap();
    store
        .record_stage(
            "p1",
            Stage::Problem,
            StageStatus::Completed,
            None,
            None,
            7,
            AuditAction::ProblemExtracted,
            serde_json::json!({}),
        )
        .unwrap();
    store
}

fn state_for(dir: &TempDir) -> DashboardState {
    DashboardState::with_paths(
        &dir.path().join("pipeline.db"),
        &dir.path().join("pid.lock"),
        100.0,
        5.0,
    )
    .unwrap()
}

#[tokio::test]
async fn index_serves_self_contained_page() {
    let dir = TempDir::new().unwrap();
    let _store = seed_store(&dir);
    let base = spawn_server(state_for(&dir)).await;

    let body = reqwest::get(format!("{base}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("<!doctype html"));
    assert!(body.contains("/api/stats"));
    // Self-contained: no external scripts or stylesheets.
    assert!(!body.contains("src=\"http"));
    assert!(!body.contains("href=\"http"));
}

#[tokio::test]
async fn stats_envelope_and_limits() {
    let dir = TempDir::new().unwrap();
    let _store = seed_store(&dir);
    let base = spawn_server(state_for(&dir)).await;

    let body: serde_json::Value = reqwest::get(format!("{base}/api/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["ok"], true);
    let data = &body["data"];
    assert_eq!(data["lifetime_spend"], 1.5);
    assert_eq!(data["window_spend"], 1.5);
    assert_eq!(data["max_usd_lifetime"], 100.0);
    assert_eq!(data["lifetime_remaining"], 98.5);
    // No lockfile: no run in progress.
    assert!(data["current_run"].is_null());
}

#[tokio::test]
async fn stats_reports_current_run_when_locked() {
    let dir = TempDir::new().unwrap();
    let _store = seed_store(&dir);
    // A live lockfile marks a run in progress.
    std::fs::write(dir.path().join("pid.lock"), b"12345").unwrap();
    let base = spawn_server(state_for(&dir)).await;

    let body: serde_json::Value = reqwest::get(format!("{base}/api/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let run = &body["data"]["current_run"];
    assert_eq!(run["run_id"], 7);
    assert_eq!(run["cost_usd"], 1.5);
    assert_eq!(run["tokens_in"], 1000);
}

#[tokio::test]
async fn activity_returns_newest_first_with_iso_timestamps() {
    let dir = TempDir::new().unwrap();
    let _store = seed_store(&dir);
    let base = spawn_server(state_for(&dir)).await;

    let body: serde_json::Value = reqwest::get(format!("{base}/api/activity?limit=10"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["ok"], true);
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    // Newest first: the stage transition came after the ingestion.
    assert_eq!(rows[0]["action"], "problem_extracted");
    assert_eq!(rows[1]["action"], "post_ingested");
    let ts = rows[0]["timestamp"].as_str().unwrap();
    assert!(ts.ends_with('Z'), "expected ISO 8601 UTC, got {ts}");
}

#[tokio::test]
async fn activity_limit_is_respected() {
    let dir = TempDir::new().unwrap();
    let _store = seed_store(&dir);
    let base = spawn_server(state_for(&dir)).await;

    let body: serde_json::Value = reqwest::get(format!("{base}/api/activity?limit=1"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn posts_endpoint_shows_in_flight_post() {
    let dir = TempDir::new().unwrap();
    let _store = seed_store(&dir);
    let base = spawn_server(state_for(&dir)).await;

    let body: serde_json::Value = reqwest::get(format!("{base}/api/posts"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["ok"], true);
    let posts = body["data"].as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["id"], "p1");
    assert_eq!(posts[0]["stage"], "problem");
}

#[tokio::test]
async fn posts_endpoint_empty_after_terminal_status() {
    let dir = TempDir::new().unwrap();
    let store = seed_store(&dir);
    store
        .record_stage(
            "p1",
            Stage::Upload,
            StageStatus::Completed,
            None,
            None,
            7,
            AuditAction::UploadSucceeded,
            serde_json::json!({}),
        )
        .unwrap();
    let base = spawn_server(state_for(&dir)).await;

    let body: serde_json::Value = reqwest::get(format!("{base}/api/posts"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn missing_database_is_an_error_envelope_at_open() {
    let dir = TempDir::new().unwrap();
    // No database file: opening the read-only store fails up front.
    let result = DashboardState::with_paths(
        &dir.path().join("missing.db"),
        &dir.path().join("pid.lock"),
        100.0,
        5.0,
    );
    assert!(result.is_err());
}
