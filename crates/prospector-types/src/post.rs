//! Candidate posts and the pipeline stage/status enums.

use serde::{Deserialize, Serialize};

/// A candidate item fetched from a discussion forum.
///
/// Inserted once at ingest; never mutated afterwards. Referenced by many
/// stage runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    /// Opaque forum-assigned identifier, unique across origins.
    pub id: String,
    /// Post title.
    pub title: String,
    /// Post body (self text). May be empty for link posts.
    #[serde(default)]
    pub body: String,
    /// Forum namespace the post came from (e.g. a subreddit name).
    pub origin: String,
    /// Author handle.
    #[serde(default)]
    pub author: String,
    /// Forum score at fetch time.
    #[serde(default)]
    pub score: i64,
    /// Canonical URL.
    #[serde(default)]
    pub url: String,
    /// Original creation time, unix seconds UTC.
    pub original_ts: i64,
    /// Raw provider payload, kept opaque for post-mortem.
    #[serde(default)]
    pub raw_json: String,
}

/// The seven ordered pipeline stages.
///
/// `Ingest` is a run-scoped prelude; the other six apply per post, in
/// declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Problem,
    Spec,
    Content,
    Verify,
    Listing,
    Upload,
}

impl Stage {
    /// Stable string form used in the database and artifact filenames.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Problem => "problem",
            Stage::Spec => "spec",
            Stage::Content => "content",
            Stage::Verify => "verify",
            Stage::Listing => "listing",
            Stage::Upload => "upload",
        }
    }

    /// Artifact file extension for this stage's output: `json` for
    /// structured stages, `md` for content, `txt` for listing copy.
    pub fn artifact_ext(&self) -> &'static str {
        match self {
            Stage::Content => "md",
            Stage::Listing => "txt",
            _ => "json",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingest" => Ok(Stage::Ingest),
            "problem" => Ok(Stage::Problem),
            "spec" => Ok(Stage::Spec),
            "content" => Ok(Stage::Content),
            "verify" => Ok(Stage::Verify),
            "listing" => Ok(Stage::Listing),
            "upload" => Ok(Stage::Upload),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// Outcome of one stage attempt.
///
/// Rows are append-only; regeneration writes additional rows for the same
/// `(post, stage)` pair. Terminal success for a post is the pair
/// `(Upload, Completed)`. `HardDiscard` is the terminal marker written
/// after the regeneration budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Discarded,
    Rejected,
    HardDiscard,
    Failed,
    CostExhausted,
}

impl StageStatus {
    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Completed => "completed",
            StageStatus::Discarded => "discarded",
            StageStatus::Rejected => "rejected",
            StageStatus::HardDiscard => "hard_discard",
            StageStatus::Failed => "failed",
            StageStatus::CostExhausted => "cost_exhausted",
        }
    }

    /// Whether this status ends work on the post for the run.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StageStatus::Completed)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(StageStatus::Completed),
            "discarded" => Ok(StageStatus::Discarded),
            "rejected" => Ok(StageStatus::Rejected),
            "hard_discard" => Ok(StageStatus::HardDiscard),
            "failed" => Ok(StageStatus::Failed),
            "cost_exhausted" => Ok(StageStatus::CostExhausted),
            other => Err(format!("unknown stage status: {other}")),
        }
    }
}

/// One recorded attempt at one stage for one post, as read back from the
/// store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRun {
    /// Autoincrement row id.
    pub id: i64,
    /// The post this attempt belongs to.
    pub post_id: String,
    /// Which stage ran.
    pub stage: Stage,
    /// How the attempt ended.
    pub status: StageStatus,
    /// On-disk artifact, when the stage produced one.
    pub artifact_path: Option<String>,
    /// Failure detail, when the stage failed.
    pub error_message: Option<String>,
    /// Insertion time, unix seconds UTC.
    pub created_at: i64,
}
