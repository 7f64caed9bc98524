//! The per-post stage machine.
//!
//! Stages are values of the closed [`Stage`] enum; the next stage is a
//! pure function of the current stage and the value it just returned,
//! written as explicit transition code. Posts are processed strictly in
//! the order the store returns them, one remote call in flight at a
//! time.
//!
//! Off-ramps:
//! - problem `discard` -> discarded (terminal)
//! - spec gate failure -> rejected (terminal)
//! - verify failure -> regenerate content, bounded by
//!   `max_regenerations`; exhaustion -> hard discard (terminal)
//! - terminal upload failure -> failed (terminal)
//! - any budget refusal -> cost exhausted: the post stops and the run
//!   starts no further posts

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use prospector_llm::RetryPolicy;
use prospector_types::{
    AuditAction, Config, PipelineError, Post, Problem, ProductSpec, Result, Stage, StageStatus,
};

use prospector_store::{ArtifactStore, Store};

use crate::agents;
use crate::gateway::ModelGateway;
use crate::governor::CostGovernor;
use crate::prompts::PromptSet;
use crate::remotes::{ForumClient, StorefrontClient};
use crate::sanitize;

/// Terminal outcome of one post in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostOutcome {
    Uploaded,
    Discarded,
    Rejected,
    HardDiscarded,
    Failed,
    CostExhausted,
}

/// Where the machine goes after a stage returns.
enum Flow {
    Next(Stage),
    Done(PostOutcome),
}

/// Tally of one orchestrator run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RunSummary {
    pub run_id: i64,
    pub ingested: usize,
    pub processed: usize,
    pub uploaded: usize,
    pub discarded: usize,
    pub rejected: usize,
    pub hard_discarded: usize,
    pub failed: usize,
    pub cost_exhausted: bool,
    pub halted_by_kill_switch: bool,
}

impl RunSummary {
    /// Process exit code: 5 when the run died of cost exhaustion,
    /// 0 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.cost_exhausted {
            5
        } else {
            0
        }
    }
}

/// Drives posts through the stage machine.
pub struct Orchestrator {
    config: Config,
    store: Arc<Store>,
    artifacts: ArtifactStore,
    governor: Arc<CostGovernor>,
    gateway: ModelGateway,
    prompts: PromptSet,
    forum: Arc<dyn ForumClient>,
    storefront: Arc<dyn StorefrontClient>,
    retry: RetryPolicy,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        store: Arc<Store>,
        artifacts: ArtifactStore,
        governor: Arc<CostGovernor>,
        gateway: ModelGateway,
        prompts: PromptSet,
        forum: Arc<dyn ForumClient>,
        storefront: Arc<dyn StorefrontClient>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            config,
            store,
            artifacts,
            governor,
            gateway,
            prompts,
            forum,
            storefront,
            retry,
        }
    }

    /// Whether the kill switch is engaged: the config flag or the flag
    /// file in the data directory.
    pub fn kill_switch_engaged(config: &Config) -> bool {
        config.kill_switch || config.kill_switch_path().exists()
    }

    /// One full run: ingest, then drive each unprocessed post to a
    /// terminal status.
    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = self.governor.run_id();
        let mut summary = RunSummary {
            run_id,
            ..RunSummary::default()
        };

        info!(run_id, "run started");
        self.ingest(&mut summary).await?;

        let posts = self.store.list_unprocessed_posts()?;
        info!(run_id, candidates = posts.len(), "processing queue");

        for post in posts {
            if Self::kill_switch_engaged(&self.config) {
                info!(run_id, "kill switch observed; stopping cleanly");
                summary.halted_by_kill_switch = true;
                break;
            }

            summary.processed += 1;
            match self.process_post(&post).await? {
                PostOutcome::Uploaded => summary.uploaded += 1,
                PostOutcome::Discarded => summary.discarded += 1,
                PostOutcome::Rejected => summary.rejected += 1,
                PostOutcome::HardDiscarded => summary.hard_discarded += 1,
                PostOutcome::Failed => summary.failed += 1,
                PostOutcome::CostExhausted => {
                    summary.cost_exhausted = true;
                    // The run is over: no further posts are started.
                    break;
                }
            }
        }

        info!(
            run_id,
            uploaded = summary.uploaded,
            discarded = summary.discarded,
            rejected = summary.rejected,
            failed = summary.failed,
            cost_exhausted = summary.cost_exhausted,
            "run finished"
        );
        Ok(summary)
    }

    /// Run-scoped ingest prelude: fetch, persist, audit new arrivals.
    async fn ingest(&self, summary: &mut RunSummary) -> Result<()> {
        let candidates = agents::ingest::fetch_candidates(
            self.forum.as_ref(),
            &self.retry,
            &self.config.origins,
            self.config.min_score,
            self.config.posts_per_origin,
        )
        .await;

        for post in candidates {
            if self.store.save_post(&post)? == prospector_store::SaveOutcome::Inserted {
                summary.ingested += 1;
                self.store.append_audit(
                    AuditAction::PostIngested,
                    Some(&post.id),
                    Some(self.governor.run_id()),
                    serde_json::json!({"origin": post.origin, "score": post.score}),
                    false,
                    false,
                )?;
                info!(post_id = %post.id, origin = %post.origin, "post ingested");
            }
        }
        Ok(())
    }

    /// Drive one post to a terminal outcome. Stage errors are resolved
    /// here; only infrastructure failures (store, artifact I/O)
    /// propagate as `Err`.
    async fn process_post(&self, post: &Post) -> Result<PostOutcome> {
        let mut stage = Stage::Problem;
        let mut problem: Option<Problem> = None;
        let mut spec: Option<ProductSpec> = None;
        let mut content: Option<String> = None;
        let mut listing_text: Option<String> = None;
        let mut content_attempts: u32 = 0;
        let max_content_attempts = 1 + self.config.max_regenerations;

        loop {
            let step = match stage {
                Stage::Problem => self.step_problem(post, &mut problem).await,
                Stage::Spec => {
                    let problem = problem.as_ref().expect("problem precedes spec");
                    self.step_spec(post, problem, &mut spec).await
                }
                Stage::Content => {
                    content_attempts += 1;
                    let spec = spec.as_ref().expect("spec precedes content");
                    self.step_content(post, spec, content_attempts, &mut content)
                        .await
                }
                Stage::Verify => {
                    let content = content.as_ref().expect("content precedes verify");
                    self.step_verify(post, content, content_attempts, max_content_attempts)
                        .await
                }
                Stage::Listing => {
                    let spec = spec.as_ref().expect("spec precedes listing");
                    let content = content.as_ref().expect("content precedes listing");
                    self.step_listing(post, spec, content, &mut listing_text).await
                }
                Stage::Upload => {
                    let spec = spec.as_ref().expect("spec precedes upload");
                    let listing = listing_text.as_ref().expect("listing precedes upload");
                    self.step_upload(post, spec, listing).await
                }
                Stage::Ingest => unreachable!("ingest is run-scoped, not per-post"),
            };

            let flow = match step {
                Ok(flow) => flow,
                Err(PipelineError::CostLimitExceeded { which, .. }) => {
                    self.handle_cost_exhausted(post, stage, which.as_str())?;
                    return Ok(PostOutcome::CostExhausted);
                }
                // A schema failure during content generation spends one
                // regeneration attempt instead of failing the post.
                Err(PipelineError::SchemaInvalid { reason, .. })
                    if stage == Stage::Content && content_attempts < max_content_attempts =>
                {
                    info!(post_id = %post.id, reason = %reason, "content attempt invalid; regenerating");
                    continue;
                }
                Err(err) => {
                    self.handle_stage_error(post, stage, &err)?;
                    return Ok(PostOutcome::Failed);
                }
            };

            match flow {
                Flow::Next(next) => stage = next,
                Flow::Done(outcome) => return Ok(outcome),
            }
        }
    }

    // ── Stage steps ──────────────────────────────────────────────────

    async fn step_problem(&self, post: &Post, out: &mut Option<Problem>) -> Result<Flow> {
        let problem = agents::problem::extract_problem(&self.gateway, &self.prompts, post).await?;
        let artifact = self
            .artifacts
            .write_stage(&post.id, Stage::Problem, &serde_json::to_string_pretty(&problem)?)?;

        if problem.discard {
            self.record(
                post,
                Stage::Problem,
                StageStatus::Discarded,
                Some(&artifact),
                None,
                AuditAction::PostDiscarded,
                serde_json::json!({"reason": "no_extractable_problem"}),
            )?;
            return Ok(Flow::Done(PostOutcome::Discarded));
        }

        self.record(
            post,
            Stage::Problem,
            StageStatus::Completed,
            Some(&artifact),
            None,
            AuditAction::ProblemExtracted,
            serde_json::json!({"urgency": problem.urgency}),
        )?;
        *out = Some(problem);
        Ok(Flow::Next(Stage::Spec))
    }

    async fn step_spec(
        &self,
        post: &Post,
        problem: &Problem,
        out: &mut Option<ProductSpec>,
    ) -> Result<Flow> {
        let spec = agents::spec::generate_spec(&self.gateway, &self.prompts, problem).await?;
        let artifact = self
            .artifacts
            .write_stage(&post.id, Stage::Spec, &serde_json::to_string_pretty(&spec)?)?;

        if !spec.accepted() {
            self.record(
                post,
                Stage::Spec,
                StageStatus::Rejected,
                Some(&artifact),
                None,
                AuditAction::PostDiscarded,
                serde_json::json!({
                    "reason": "spec_rejected",
                    "build": spec.build,
                    "confidence": spec.confidence,
                    "deliverables": spec.deliverables.len(),
                }),
            )?;
            return Ok(Flow::Done(PostOutcome::Rejected));
        }

        self.record(
            post,
            Stage::Spec,
            StageStatus::Completed,
            Some(&artifact),
            None,
            AuditAction::SpecGenerated,
            serde_json::json!({"title": spec.title, "confidence": spec.confidence}),
        )?;
        *out = Some(spec);
        Ok(Flow::Next(Stage::Content))
    }

    async fn step_content(
        &self,
        post: &Post,
        spec: &ProductSpec,
        attempt: u32,
        out: &mut Option<String>,
    ) -> Result<Flow> {
        let raw = agents::content::generate_content(&self.gateway, &self.prompts, spec).await?;
        let content = sanitize::listing(&raw);
        let artifact = self
            .artifacts
            .write_stage(&post.id, Stage::Content, &content)?;

        self.record(
            post,
            Stage::Content,
            StageStatus::Completed,
            Some(&artifact),
            None,
            AuditAction::ContentGenerated,
            serde_json::json!({"attempt": attempt, "chars": content.len()}),
        )?;
        *out = Some(content);
        Ok(Flow::Next(Stage::Verify))
    }

    async fn step_verify(
        &self,
        post: &Post,
        content: &str,
        attempt: u32,
        max_attempts: u32,
    ) -> Result<Flow> {
        let verdict = agents::verify::verify_content(&self.gateway, &self.prompts, content).await?;
        let artifact = self.artifacts.write_verify_attempt(
            &post.id,
            attempt,
            &serde_json::to_string_pretty(&verdict)?,
        )?;

        if verdict.pass {
            self.record(
                post,
                Stage::Verify,
                StageStatus::Completed,
                Some(&artifact),
                None,
                AuditAction::ContentVerified,
                serde_json::json!({"attempt": attempt, "example_score": verdict.example_score}),
            )?;
            return Ok(Flow::Next(Stage::Listing));
        }

        self.record(
            post,
            Stage::Verify,
            StageStatus::Rejected,
            Some(&artifact),
            None,
            AuditAction::ContentRejected,
            serde_json::json!({
                "attempt": attempt,
                "reasons": verdict.reasons,
                "missing": verdict.missing,
            }),
        )?;

        if attempt < max_attempts {
            return Ok(Flow::Next(Stage::Content));
        }

        // Regeneration budget exhausted: terminal marker row.
        self.record(
            post,
            Stage::Verify,
            StageStatus::HardDiscard,
            None,
            Some("regeneration budget exhausted"),
            AuditAction::PostDiscarded,
            serde_json::json!({"reason": "hard_discard", "attempts": attempt}),
        )?;
        Ok(Flow::Done(PostOutcome::HardDiscarded))
    }

    async fn step_listing(
        &self,
        post: &Post,
        spec: &ProductSpec,
        content: &str,
        out: &mut Option<String>,
    ) -> Result<Flow> {
        let listing =
            agents::listing::generate_listing(&self.gateway, &self.prompts, spec, content).await?;
        let artifact = self
            .artifacts
            .write_stage(&post.id, Stage::Listing, &listing)?;

        self.record(
            post,
            Stage::Listing,
            StageStatus::Completed,
            Some(&artifact),
            None,
            AuditAction::ListingGenerated,
            serde_json::json!({"chars": listing.len()}),
        )?;
        *out = Some(listing);
        Ok(Flow::Next(Stage::Upload))
    }

    async fn step_upload(&self, post: &Post, spec: &ProductSpec, listing_text: &str) -> Result<Flow> {
        match agents::upload::upload_product(
            self.storefront.as_ref(),
            &self.retry,
            spec,
            listing_text,
        )
        .await
        {
            Ok(listed) => {
                let receipt = serde_json::json!({
                    "product_id": listed.product_id,
                    "url": listed.url,
                    "price_cents": spec.price_cents(),
                });
                let artifact = self.artifacts.write_stage(
                    &post.id,
                    Stage::Upload,
                    &serde_json::to_string_pretty(&receipt)?,
                )?;
                self.record(
                    post,
                    Stage::Upload,
                    StageStatus::Completed,
                    Some(&artifact),
                    None,
                    AuditAction::UploadSucceeded,
                    receipt,
                )?;
                Ok(Flow::Done(PostOutcome::Uploaded))
            }
            Err(err @ PipelineError::CostLimitExceeded { .. }) => Err(err),
            Err(err) => {
                // One logical attempt: a terminal failure here fails the
                // post with its own audit action.
                let payload = serde_json::json!({
                    "stage": "upload",
                    "error": err.to_string(),
                });
                let error_artifact = self.artifacts.write_error(&post.id, Stage::Upload, &payload)?;
                self.record(
                    post,
                    Stage::Upload,
                    StageStatus::Failed,
                    Some(&error_artifact),
                    Some(&err.to_string()),
                    AuditAction::UploadFailed,
                    payload,
                )?;
                Ok(Flow::Done(PostOutcome::Failed))
            }
        }
    }

    // ── Failure handling ─────────────────────────────────────────────

    /// Budget refusal: abort artifact, terminal stage row, run stops.
    fn handle_cost_exhausted(&self, post: &Post, stage: Stage, reason: &str) -> Result<()> {
        let stats = self.governor.run_stats();
        self.artifacts.write_abort(
            stats.run_id,
            &serde_json::json!({
                "run_id": stats.run_id,
                "reason": reason,
                "tokens_sent": stats.tokens_sent,
                "tokens_received": stats.tokens_received,
                "run_cost": stats.run_cost_usd,
                "timestamp": chrono::Utc::now().timestamp(),
            }),
        )?;

        self.record(
            post,
            stage,
            StageStatus::CostExhausted,
            None,
            Some(reason),
            AuditAction::CostExhausted,
            serde_json::json!({"which": reason}),
        )?;
        Ok(())
    }

    /// Any other stage failure: error artifact, failed stage row, run
    /// continues with the next post.
    fn handle_stage_error(&self, post: &Post, stage: Stage, err: &PipelineError) -> Result<()> {
        error!(post_id = %post.id, stage = %stage, error = %err, "stage failed");
        let payload = serde_json::json!({
            "stage": stage.as_str(),
            "error": err.to_string(),
            "timestamp": chrono::Utc::now().timestamp(),
        });
        let artifact = self.artifacts.write_error(&post.id, stage, &payload)?;
        self.record(
            post,
            stage,
            StageStatus::Failed,
            Some(&artifact),
            Some(&err.to_string()),
            AuditAction::ErrorOccurred,
            payload,
        )?;
        Ok(())
    }

    /// Persist one stage outcome and print the transition line.
    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        post: &Post,
        stage: Stage,
        status: StageStatus,
        artifact: Option<&Path>,
        error_message: Option<&str>,
        action: AuditAction,
        details: serde_json::Value,
    ) -> Result<()> {
        self.store.record_stage(
            &post.id,
            stage,
            status,
            artifact,
            error_message,
            self.governor.run_id(),
            action,
            details,
        )?;
        info!(post_id = %post.id, stage = %stage, status = %status, "stage transition");
        Ok(())
    }
}
