//! Per-stage prompt templates.
//!
//! Templates are read once per run from the configured directory when
//! present, falling back to the compiled-in defaults. Substitution uses
//! literal `<<TOKEN>>` placeholders.

use std::path::Path;

use prospector_types::Result;

/// The five model-backed stage templates.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub problem: String,
    pub spec: String,
    pub content: String,
    pub verify: String,
    pub listing: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            problem: include_str!("../prompts/problem.txt").to_string(),
            spec: include_str!("../prompts/spec.txt").to_string(),
            content: include_str!("../prompts/content.txt").to_string(),
            verify: include_str!("../prompts/verify.txt").to_string(),
            listing: include_str!("../prompts/listing.txt").to_string(),
        }
    }
}

impl PromptSet {
    /// Load templates from `dir` when given, defaulting any file that
    /// is absent there.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut set = Self::default();
        let Some(dir) = dir else {
            return Ok(set);
        };
        for (name, slot) in [
            ("problem.txt", &mut set.problem),
            ("spec.txt", &mut set.spec),
            ("content.txt", &mut set.content),
            ("verify.txt", &mut set.verify),
            ("listing.txt", &mut set.listing),
        ] {
            let path = dir.join(name);
            if path.exists() {
                *slot = std::fs::read_to_string(&path)?;
            }
        }
        Ok(set)
    }
}

/// Substitute one `<<TOKEN>>` placeholder.
pub fn fill(template: &str, token: &str, value: &str) -> String {
    template.replace(&format!("<<{token}>>"), value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_placeholders() {
        let set = PromptSet::default();
        assert!(set.problem.contains("<<POST>>"));
        assert!(set.spec.contains("<<PROBLEM_JSON>>"));
        assert!(set.content.contains("<<DELIVERABLES>>"));
        assert!(set.verify.contains("<<CONTENT>>"));
        assert!(set.listing.contains("<<PRODUCT_SUMMARY>>"));
    }

    #[test]
    fn fill_replaces_every_occurrence() {
        let out = fill("a <<X>> b <<X>>", "X", "y");
        assert_eq!(out, "a y b y");
    }

    #[test]
    fn load_prefers_directory_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("problem.txt"), "custom <<POST>>").unwrap();

        let set = PromptSet::load(Some(dir.path())).unwrap();
        assert_eq!(set.problem, "custom <<POST>>");
        // Missing files fall back to defaults.
        assert!(set.verify.contains("<<CONTENT>>"));
    }

    #[test]
    fn load_without_dir_uses_defaults() {
        let set = PromptSet::load(None).unwrap();
        assert_eq!(set.problem, PromptSet::default().problem);
    }
}
