//! Content stage: write the full product in markdown.

use prospector_types::{ProductSpec, Result};

use crate::gateway::ModelGateway;
use crate::prompts::{fill, PromptSet};

const MAX_OUT_TOKENS: u32 = 3000;

/// Generate the product content for an accepted spec.
pub async fn generate_content(
    gateway: &ModelGateway,
    prompts: &PromptSet,
    spec: &ProductSpec,
) -> Result<String> {
    let mut system = prompts.content.clone();
    system = fill(&system, "TYPE", spec.product_type.as_str());
    system = fill(&system, "BUYER", &spec.buyer);
    system = fill(&system, "JOB", &spec.job_to_be_done);
    system = fill(&system, "DELIVERABLES", &spec.deliverables.join(", "));
    system = fill(&system, "FAILURE_REASON", &spec.failure_reason);

    gateway.call_text("content", &system, "", MAX_OUT_TOKENS).await
}
