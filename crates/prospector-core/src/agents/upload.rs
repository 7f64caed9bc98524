//! Upload stage: push the finished product to the storefront.
//!
//! Exactly one logical creation call per post. The retry policy covers
//! transport failures only; a semantic rejection from the storefront is
//! terminal for the post.

use prospector_llm::{RemoteKind, RetryPolicy};
use prospector_types::{PipelineError, ProductSpec, Result};

use crate::remotes::{ListedProduct, NewProduct, StorefrontClient};
use crate::sanitize;

const MAX_TITLE_CHARS: usize = 100;
const END_MARKERS: [&str; 3] = ["What You Get:", "Who This Is NOT For:", "FAQ"];

/// Extract the listing fields, sanitize, and create the product.
pub async fn upload_product(
    client: &dyn StorefrontClient,
    retry: &RetryPolicy,
    spec: &ProductSpec,
    listing_text: &str,
) -> Result<ListedProduct> {
    let product = build_product(spec, listing_text)?;
    retry
        .execute(RemoteKind::Storefront, || client.create_product(&product))
        .await
        .map_err(|e| PipelineError::Remote(Box::new(e)))
}

/// Parse and validate the listing copy into a product payload.
pub fn build_product(spec: &ProductSpec, listing_text: &str) -> Result<NewProduct> {
    let title = extract_field(listing_text, "Title:").unwrap_or_else(|| spec.title.clone());
    let description = extract_description(listing_text);

    if title.trim().chars().count() < 3 {
        return Err(PipelineError::SchemaInvalid {
            stage: "upload".into(),
            reason: format!("listing title too short: {title:?}"),
        });
    }
    if description.trim().chars().count() < 10 {
        return Err(PipelineError::SchemaInvalid {
            stage: "upload".into(),
            reason: format!("listing description too short ({} chars)", description.len()),
        });
    }

    Ok(NewProduct {
        title: title.chars().take(MAX_TITLE_CHARS).collect(),
        description: sanitize::listing(&description),
        price_cents: spec.price_cents(),
    })
}

/// First line starting with `marker`, with the marker removed.
fn extract_field(text: &str, marker: &str) -> Option<String> {
    text.lines()
        .find(|line| line.starts_with(marker))
        .map(|line| line[marker.len()..].trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Everything after `Description:` up to the first end marker; the
/// whole text when the marker is missing.
fn extract_description(text: &str) -> String {
    let Some(start) = text.find("Description:") else {
        return text.trim().to_string();
    };

    let after = start + "Description:".len();
    let mut end = text.len();
    for marker in END_MARKERS {
        if let Some(pos) = text[after..].find(marker) {
            end = end.min(after + pos);
        }
    }

    let description = text[after..end].trim();
    if description.is_empty() {
        text.trim().to_string()
    } else {
        description.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_types::ProductType;

    fn spec() -> ProductSpec {
        ProductSpec {
            build: true,
            product_type: ProductType::Guide,
            title: "Fallback Title".into(),
            buyer: "buyer".into(),
            job_to_be_done: "job".into(),
            deliverables: vec!["a".into(), "b".into(), "c".into()],
            failure_reason: String::new(),
            price: 19.99,
            confidence: 90,
        }
    }

    const LISTING: &str = "Title: The Invoice Rescue Kit\n\
        Description: Stop chasing unpaid invoices.\n\
        A complete system for getting paid on time.\n\
        What You Get: templates and scripts";

    #[test]
    fn extracts_title_and_description() {
        let product = build_product(&spec(), LISTING).unwrap();
        assert_eq!(product.title, "The Invoice Rescue Kit");
        assert!(product.description.contains("Stop chasing unpaid invoices."));
        // Cut at the end marker.
        assert!(!product.description.contains("What You Get"));
        assert_eq!(product.price_cents, 1999);
    }

    #[test]
    fn missing_title_falls_back_to_spec() {
        let text = "Description: A fine product with plenty of words.";
        let product = build_product(&spec(), text).unwrap();
        assert_eq!(product.title, "Fallback Title");
    }

    #[test]
    fn missing_description_marker_uses_whole_text() {
        let text = "Just some listing copy without any markers at all.";
        let product = build_product(&spec(), text).unwrap();
        assert!(product.description.contains("listing copy"));
    }

    #[test]
    fn short_title_is_rejected() {
        let mut s = spec();
        s.title = "ab".into();
        let text = "Description: A fine product with plenty of words.";
        let err = build_product(&s, text).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaInvalid { .. }));
    }

    #[test]
    fn short_description_is_rejected() {
        let text = "Title: Good Product\nDescription: tiny";
        let err = build_product(&spec(), text).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaInvalid { .. }));
    }

    #[test]
    fn title_truncated_to_limit() {
        let long_title = "T".repeat(300);
        let text = format!("Title: {long_title}\nDescription: A fine product description.");
        let product = build_product(&spec(), &text).unwrap();
        assert_eq!(product.title.chars().count(), 100);
    }

    #[test]
    fn description_is_listing_sanitized() {
        let text = "Title: Good Product\nDescription: Great stuff <script>alert(1)</script> here.";
        let product = build_product(&spec(), text).unwrap();
        assert!(!product.description.to_lowercase().contains("<script"));
        assert!(!product.description.contains("alert(1)"));
    }
}
