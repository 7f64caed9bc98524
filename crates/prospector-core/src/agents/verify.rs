//! Verification stage: judge generated content against the spec.

use prospector_types::{PipelineError, Result, Verdict};

use crate::gateway::ModelGateway;
use crate::prompts::{fill, PromptSet};

const MAX_OUT_TOKENS: u32 = 1000;

/// Verify one content attempt. The returned verdict already has the
/// hard quality gate applied on top of the model's own judgment.
pub async fn verify_content(
    gateway: &ModelGateway,
    prompts: &PromptSet,
    content: &str,
) -> Result<Verdict> {
    let system = fill(&prompts.verify, "CONTENT", content);

    let verdict: Verdict = gateway
        .call_structured("verify", &system, "", MAX_OUT_TOKENS)
        .await?;
    verdict.validate().map_err(|reason| PipelineError::SchemaInvalid {
        stage: "verify".into(),
        reason,
    })?;
    Ok(verdict.with_hard_gate())
}
