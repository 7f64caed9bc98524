//! # prospector-dashboard
//!
//! Stateless read-only HTTP service projecting live pipeline metrics
//! from the store. Four endpoints:
//!
//! - `GET /` -- self-contained HTML page polling the JSON endpoints
//! - `GET /api/stats` -- spend, token, and terminal-status summary
//! - `GET /api/activity` -- recent audit events, newest first
//! - `GET /api/posts` -- posts currently in flight
//!
//! Every JSON response is enveloped as `{ok, data}` or `{ok, error}`.
//! The store is opened read-only; the dashboard can never block or
//! mutate the writer.

mod page;

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use prospector_store::{ReadStore, StoreError};
use prospector_types::Config;

const DEFAULT_ACTIVITY_LIMIT: usize = 20;
const STATS_WINDOW_HOURS: i64 = 24;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct DashboardState {
    read: Arc<ReadStore>,
    /// Configured ceilings surfaced in `/api/stats`.
    max_usd_lifetime: f64,
    max_usd_per_run: f64,
    /// Orchestrator lockfile; its presence marks a run in progress.
    lock_path: std::path::PathBuf,
}

impl DashboardState {
    /// Open the store read-only and capture the limits to display.
    pub fn new(config: &Config) -> Result<Self, StoreError> {
        let read = ReadStore::open(&config.database_path)?;
        Ok(Self {
            read: Arc::new(read),
            max_usd_lifetime: config.max_usd_lifetime,
            max_usd_per_run: config.max_usd_per_run,
            lock_path: config.lock_path(),
        })
    }

    /// State over an explicit database path (test use).
    pub fn with_paths(
        database_path: &Path,
        lock_path: &Path,
        max_usd_lifetime: f64,
        max_usd_per_run: f64,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            read: Arc::new(ReadStore::open(database_path)?),
            max_usd_lifetime,
            max_usd_per_run,
            lock_path: lock_path.to_path_buf(),
        })
    }
}

/// Build the router with all four routes.
pub fn build_router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/stats", get(api_stats))
        .route("/api/activity", get(api_activity))
        .route("/api/posts", get(api_posts))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the listener fails. Binds `0.0.0.0:<port>`.
pub async fn serve(state: DashboardState, port: u16) -> std::io::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "dashboard listening");
    axum::serve(listener, router).await
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn index() -> Html<&'static str> {
    Html(page::INDEX_HTML)
}

fn ok_envelope(data: serde_json::Value) -> Json<serde_json::Value> {
    Json(json!({"ok": true, "data": data}))
}

fn err_envelope(err: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({"ok": false, "error": err.to_string()}))
}

async fn api_stats(State(state): State<DashboardState>) -> Json<serde_json::Value> {
    let run_in_progress = state.lock_path.exists();
    let read = Arc::clone(&state.read);
    let result =
        tokio::task::spawn_blocking(move || read.stats(STATS_WINDOW_HOURS, run_in_progress)).await;

    match result {
        Ok(Ok(stats)) => {
            let mut data = serde_json::to_value(&stats).unwrap_or_default();
            if let Some(obj) = data.as_object_mut() {
                obj.insert("max_usd_lifetime".into(), json!(state.max_usd_lifetime));
                obj.insert("max_usd_per_run".into(), json!(state.max_usd_per_run));
                obj.insert(
                    "lifetime_remaining".into(),
                    json!((state.max_usd_lifetime - stats.lifetime_spend).max(0.0)),
                );
            }
            ok_envelope(data)
        }
        Ok(Err(e)) => err_envelope(e),
        Err(e) => err_envelope(e),
    }
}

#[derive(Deserialize)]
struct ActivityParams {
    limit: Option<usize>,
}

async fn api_activity(
    State(state): State<DashboardState>,
    Query(params): Query<ActivityParams>,
) -> Json<serde_json::Value> {
    let limit = params.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT).min(500);
    let read = Arc::clone(&state.read);
    let result = tokio::task::spawn_blocking(move || read.recent_activity(limit)).await;

    match result {
        Ok(Ok(rows)) => ok_envelope(serde_json::to_value(rows).unwrap_or_default()),
        Ok(Err(e)) => err_envelope(e),
        Err(e) => err_envelope(e),
    }
}

async fn api_posts(State(state): State<DashboardState>) -> Json<serde_json::Value> {
    let read = Arc::clone(&state.read);
    let result = tokio::task::spawn_blocking(move || read.posts_in_flight()).await;

    match result {
        Ok(Ok(posts)) => ok_envelope(serde_json::to_value(posts).unwrap_or_default()),
        Ok(Err(e)) => err_envelope(e),
        Err(e) => err_envelope(e),
    }
}
