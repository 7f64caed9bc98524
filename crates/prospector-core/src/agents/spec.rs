//! Spec stage: turn a problem analysis into a product definition.

use prospector_types::{PipelineError, Problem, ProductSpec, Result};

use crate::gateway::ModelGateway;
use crate::prompts::{fill, PromptSet};

const MAX_OUT_TOKENS: u32 = 1500;

/// Generate a product spec from a problem analysis.
///
/// The acceptance gate ([`ProductSpec::accepted`]) is applied by the
/// orchestrator; this agent only validates the schema.
pub async fn generate_spec(
    gateway: &ModelGateway,
    prompts: &PromptSet,
    problem: &Problem,
) -> Result<ProductSpec> {
    let problem_json = serde_json::to_string_pretty(problem)?;
    let system = fill(&prompts.spec, "PROBLEM_JSON", &problem_json);

    let spec: ProductSpec = gateway
        .call_structured("spec", &system, "", MAX_OUT_TOKENS)
        .await?;
    spec.validate().map_err(|reason| PipelineError::SchemaInvalid {
        stage: "spec".into(),
        reason,
    })?;
    Ok(spec)
}
