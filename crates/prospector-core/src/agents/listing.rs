//! Listing stage: write the storefront copy.

use prospector_types::{ProductSpec, Result};

use crate::gateway::ModelGateway;
use crate::prompts::{fill, PromptSet};

const MAX_OUT_TOKENS: u32 = 1500;
const CONTENT_PREVIEW_CHARS: usize = 500;

/// Generate listing copy from the spec plus a content preview. The
/// output carries `Title:` and `Description:` markers the upload stage
/// extracts from.
pub async fn generate_listing(
    gateway: &ModelGateway,
    prompts: &PromptSet,
    spec: &ProductSpec,
    content: &str,
) -> Result<String> {
    let preview: String = content.chars().take(CONTENT_PREVIEW_CHARS).collect();
    let summary = format!(
        "Product: {}\nType: {}\nTarget buyer: {}\nJob to be done: {}\nWhy existing products fail: {}\nDeliverables: {}\nContent preview: {}",
        spec.title,
        spec.product_type,
        spec.buyer,
        spec.job_to_be_done,
        spec.failure_reason,
        spec.deliverables.join(", "),
        preview
    );
    let system = fill(&prompts.listing, "PRODUCT_SUMMARY", &summary);

    gateway.call_text("listing", &system, "", MAX_OUT_TOKENS).await
}
