//! The closed audit action enum.
//!
//! Every observable pipeline event appends exactly one row with one of
//! these actions. The store exposes no update or delete on the audit
//! table; correction is another append.

use serde::{Deserialize, Serialize};

/// Closed set of audit trail actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    PostIngested,
    ProblemExtracted,
    SpecGenerated,
    ContentGenerated,
    ContentVerified,
    ContentRejected,
    ListingGenerated,
    UploadSucceeded,
    UploadFailed,
    PostDiscarded,
    CostExhausted,
    ErrorOccurred,
}

impl AuditAction {
    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::PostIngested => "post_ingested",
            AuditAction::ProblemExtracted => "problem_extracted",
            AuditAction::SpecGenerated => "spec_generated",
            AuditAction::ContentGenerated => "content_generated",
            AuditAction::ContentVerified => "content_verified",
            AuditAction::ContentRejected => "content_rejected",
            AuditAction::ListingGenerated => "listing_generated",
            AuditAction::UploadSucceeded => "upload_succeeded",
            AuditAction::UploadFailed => "upload_failed",
            AuditAction::PostDiscarded => "post_discarded",
            AuditAction::CostExhausted => "cost_exhausted",
            AuditAction::ErrorOccurred => "error_occurred",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post_ingested" => Ok(AuditAction::PostIngested),
            "problem_extracted" => Ok(AuditAction::ProblemExtracted),
            "spec_generated" => Ok(AuditAction::SpecGenerated),
            "content_generated" => Ok(AuditAction::ContentGenerated),
            "content_verified" => Ok(AuditAction::ContentVerified),
            "content_rejected" => Ok(AuditAction::ContentRejected),
            "listing_generated" => Ok(AuditAction::ListingGenerated),
            "upload_succeeded" => Ok(AuditAction::UploadSucceeded),
            "upload_failed" => Ok(AuditAction::UploadFailed),
            "post_discarded" => Ok(AuditAction::PostDiscarded),
            "cost_exhausted" => Ok(AuditAction::CostExhausted),
            "error_occurred" => Ok(AuditAction::ErrorOccurred),
            other => Err(format!("unknown audit action: {other}")),
        }
    }
}

/// One audit row as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Autoincrement row id; insertion order is the authoritative order.
    pub id: i64,
    /// Event time, unix seconds UTC.
    pub timestamp: i64,
    /// What happened.
    pub action: AuditAction,
    /// Post involved, when applicable.
    pub post_id: Option<String>,
    /// Orchestrator run involved, when applicable.
    pub run_id: Option<i64>,
    /// Structured context payload.
    pub details: serde_json::Value,
    /// Set when the event records a failure.
    pub error_flag: bool,
    /// Set when the event records a budget refusal.
    pub cost_exhausted_flag: bool,
}
