//! Structured outputs of the model-backed stages.
//!
//! Each struct mirrors the JSON schema a stage expects back from the
//! model. Deserialization is lenient on missing optional fields but the
//! `validate` methods enforce the numeric ranges, so a value that parses
//! still fails the stage if it is out of range.

use serde::{Deserialize, Serialize};

/// Output of the problem-extraction stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Problem {
    /// True when the post carries no extractable problem worth pursuing.
    pub discard: bool,
    /// One-paragraph statement of the problem.
    #[serde(default)]
    pub summary: String,
    /// Who has this problem.
    #[serde(default)]
    pub audience: String,
    /// Why it matters to them.
    #[serde(default)]
    pub why_matters: String,
    /// Existing solutions and why they fall short.
    #[serde(default)]
    pub bad_solutions: Vec<String>,
    /// Urgency, 0..=100.
    #[serde(default)]
    pub urgency: u8,
    /// Verbatim quotes from the post supporting the analysis.
    #[serde(default)]
    pub quotes: Vec<String>,
}

impl Problem {
    /// Range check applied after deserialization.
    pub fn validate(&self) -> Result<(), String> {
        if self.urgency > 100 {
            return Err(format!("urgency {} out of range 0..=100", self.urgency));
        }
        Ok(())
    }
}

/// Product category produced by the spec stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Guide,
    Template,
    PromptPack,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Guide => "guide",
            ProductType::Template => "template",
            ProductType::PromptPack => "prompt_pack",
        }
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the spec stage: what to build and for whom.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSpec {
    /// Whether a product should be built at all.
    pub build: bool,
    /// Product category.
    #[serde(default = "default_product_type", rename = "type")]
    pub product_type: ProductType,
    /// Working title.
    #[serde(default)]
    pub title: String,
    /// Target buyer.
    #[serde(default)]
    pub buyer: String,
    /// The job the buyer hires this product to do.
    #[serde(default)]
    pub job_to_be_done: String,
    /// Concrete deliverables the product must contain.
    #[serde(default)]
    pub deliverables: Vec<String>,
    /// Why existing products fail at the job.
    #[serde(default)]
    pub failure_reason: String,
    /// Recommended price in USD.
    #[serde(default)]
    pub price: f64,
    /// Model's confidence in the spec, 0..=100.
    #[serde(default)]
    pub confidence: u8,
}

fn default_product_type() -> ProductType {
    ProductType::Guide
}

impl ProductSpec {
    /// Range check applied after deserialization.
    pub fn validate(&self) -> Result<(), String> {
        if self.confidence > 100 {
            return Err(format!("confidence {} out of range 0..=100", self.confidence));
        }
        if self.price < 0.0 {
            return Err(format!("price {} is negative", self.price));
        }
        Ok(())
    }

    /// The spec acceptance gate: build flag, confidence floor, and a
    /// minimum of three deliverables.
    pub fn accepted(&self) -> bool {
        self.build && self.confidence >= 70 && self.deliverables.len() >= 3
    }

    /// Listing price in cents, rounded.
    pub fn price_cents(&self) -> i64 {
        (self.price * 100.0).round() as i64
    }
}

/// Output of the verification stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    /// Whether the content passes as-is.
    pub pass: bool,
    /// Reasons supporting the verdict.
    #[serde(default)]
    pub reasons: Vec<String>,
    /// Deliverables promised by the spec but missing from the content.
    #[serde(default)]
    pub missing: Vec<String>,
    /// Whether the content reads as generic filler.
    #[serde(default)]
    pub generic: bool,
    /// Quality of worked examples, 0..=10.
    #[serde(default)]
    pub example_score: u8,
    /// Whether the verifier asks for another content attempt.
    #[serde(default)]
    pub needs_regeneration: bool,
}

impl Verdict {
    /// Range check applied after deserialization.
    pub fn validate(&self) -> Result<(), String> {
        if self.example_score > 10 {
            return Err(format!(
                "example_score {} out of range 0..=10",
                self.example_score
            ));
        }
        Ok(())
    }

    /// Apply the hard quality gate on top of the model's own verdict: a
    /// low example score, generic language, or any missing deliverable
    /// overrides `pass = true`.
    pub fn with_hard_gate(mut self) -> Self {
        if self.example_score < 7 || self.generic || !self.missing.is_empty() {
            self.pass = false;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing_verdict() -> Verdict {
        Verdict {
            pass: true,
            reasons: vec!["solid".into()],
            missing: vec![],
            generic: false,
            example_score: 9,
            needs_regeneration: false,
        }
    }

    #[test]
    fn problem_urgency_range() {
        let mut p: Problem = serde_json::from_str(r#"{"discard":false,"urgency":50}"#).unwrap();
        assert!(p.validate().is_ok());
        p.urgency = 101;
        assert!(p.validate().is_err());
    }

    #[test]
    fn product_type_snake_case() {
        let t: ProductType = serde_json::from_str(r#""prompt_pack""#).unwrap();
        assert_eq!(t, ProductType::PromptPack);
        assert_eq!(t.as_str(), "prompt_pack");
    }

    #[test]
    fn spec_gate_requires_all_three() {
        let mut spec = ProductSpec {
            build: true,
            product_type: ProductType::Guide,
            title: "T".into(),
            buyer: "B".into(),
            job_to_be_done: "J".into(),
            deliverables: vec!["a".into(), "b".into(), "c".into()],
            failure_reason: String::new(),
            price: 19.0,
            confidence: 87,
        };
        assert!(spec.accepted());

        spec.confidence = 69;
        assert!(!spec.accepted());

        spec.confidence = 70;
        spec.deliverables.pop();
        assert!(!spec.accepted());

        spec.deliverables.push("c".into());
        spec.build = false;
        assert!(!spec.accepted());
    }

    #[test]
    fn spec_confidence_boundary_is_inclusive() {
        let spec = ProductSpec {
            build: true,
            product_type: ProductType::Template,
            title: String::new(),
            buyer: String::new(),
            job_to_be_done: String::new(),
            deliverables: vec!["a".into(), "b".into(), "c".into()],
            failure_reason: String::new(),
            price: 9.0,
            confidence: 70,
        };
        assert!(spec.accepted());
    }

    #[test]
    fn price_cents_rounds() {
        let mut spec: ProductSpec =
            serde_json::from_str(r#"{"build":true,"price":19.99}"#).unwrap();
        assert_eq!(spec.price_cents(), 1999);
        spec.price = 10.0;
        assert_eq!(spec.price_cents(), 1000);
        spec.price = 0.996;
        assert_eq!(spec.price_cents(), 100);
    }

    #[test]
    fn verdict_hard_gate_low_example_score() {
        let v = Verdict {
            example_score: 6,
            ..passing_verdict()
        };
        assert!(!v.with_hard_gate().pass);
    }

    #[test]
    fn verdict_hard_gate_generic_language() {
        let v = Verdict {
            generic: true,
            ..passing_verdict()
        };
        assert!(!v.with_hard_gate().pass);
    }

    #[test]
    fn verdict_hard_gate_missing_elements() {
        let v = Verdict {
            missing: vec!["checklist".into()],
            ..passing_verdict()
        };
        assert!(!v.with_hard_gate().pass);
    }

    #[test]
    fn verdict_hard_gate_keeps_clean_pass() {
        assert!(passing_verdict().with_hard_gate().pass);
    }

    #[test]
    fn spec_type_field_renamed() {
        let spec: ProductSpec =
            serde_json::from_str(r#"{"build":true,"type":"template"}"#).unwrap();
        assert_eq!(spec.product_type, ProductType::Template);
    }
}
