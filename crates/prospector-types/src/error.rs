//! Error types for the prospector pipeline.
//!
//! [`PipelineError`] is the top-level taxonomy the orchestrator and CLI
//! work with. Transport-level failures from the three remotes live in
//! `prospector_llm::RemoteError` and arrive here through the `Remote`
//! variant as a boxed source.

use thiserror::Error;

/// Which of the three configured budgets a refused call would have
/// breached. Doubles as the `abort_reason` string recorded on the
/// refusal cost entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LimitKind {
    /// Per-run token ceiling (`max_tokens_per_run`).
    PerRunTokens,
    /// Per-run spend ceiling (`max_usd_per_run`).
    PerRunUsd,
    /// Lifetime spend ceiling (`max_usd_lifetime`).
    LifetimeUsd,
}

impl LimitKind {
    /// Stable string form used in cost entries and audit details.
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::PerRunTokens => "per_run_tokens",
            LimitKind::PerRunUsd => "per_run_usd",
            LimitKind::LifetimeUsd => "lifetime_usd",
        }
    }
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for the pipeline.
///
/// Variants are grouped into startup failures (config, lock), per-attempt
/// failures the orchestrator resolves (remote, schema), and the one error
/// that halts the run outright (cost limit).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PipelineError {
    // ── Startup ──────────────────────────────────────────────────────

    /// Configuration is malformed or semantically invalid. Carries every
    /// reason found, not just the first.
    #[error("invalid config: {}", reasons.join("; "))]
    ConfigInvalid {
        /// All validation failures, one human-readable line each.
        reasons: Vec<String>,
    },

    /// Another orchestrator instance holds the data-directory lock.
    #[error("lock contended: {path}")]
    LockContended {
        /// Path of the contested lockfile.
        path: String,
    },

    // ── Run-time ─────────────────────────────────────────────────────

    /// A pre-call budget projection exceeded its limit. Never retried;
    /// terminates the run.
    #[error("cost limit exceeded ({which}): {actual} > {limit}")]
    CostLimitExceeded {
        /// The budget that would have been breached.
        which: LimitKind,
        /// The projected value.
        actual: f64,
        /// The configured ceiling.
        limit: f64,
    },

    /// The model returned a value that does not conform to the stage
    /// schema. Terminal for the attempt; the orchestrator decides whether
    /// a regeneration budget applies.
    #[error("schema invalid at stage {stage}: {reason}")]
    SchemaInvalid {
        /// Stage whose schema was violated.
        stage: String,
        /// What failed to parse or validate.
        reason: String,
    },

    /// A remote call failed after the retry layer gave up (or failed
    /// terminally on the first attempt).
    #[error("remote error: {0}")]
    Remote(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The relational store rejected an operation.
    #[error("store error: {0}")]
    Store(String),

    /// Underlying I/O error (artifact writes, lockfile, backups).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error outside a stage schema.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Process exit code for this error per the orchestrator contract:
    /// 2 config, 3 lock, 5 cost exhaustion, 1 anything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::ConfigInvalid { .. } => 2,
            PipelineError::LockContended { .. } => 3,
            PipelineError::CostLimitExceeded { .. } => 5,
            _ => 1,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, PipelineError>;
