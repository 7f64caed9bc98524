//! Problem-extraction stage.

use prospector_types::{PipelineError, Post, Problem, Result};

use crate::gateway::ModelGateway;
use crate::prompts::{fill, PromptSet};

const MAX_BODY_CHARS: usize = 2000;
const MAX_OUT_TOKENS: u32 = 1500;

/// Extract a problem analysis from one post.
pub async fn extract_problem(
    gateway: &ModelGateway,
    prompts: &PromptSet,
    post: &Post,
) -> Result<Problem> {
    let body = truncate_at_boundary(&post.body, MAX_BODY_CHARS);
    let post_text = format!(
        "Title: {}\nOrigin: {}\nAuthor: {}\nScore: {}\nContent: {}",
        post.title, post.origin, post.author, post.score, body
    );
    let system = fill(&prompts.problem, "POST", &post_text);

    let problem: Problem = gateway
        .call_structured("problem", &system, "", MAX_OUT_TOKENS)
        .await?;
    problem.validate().map_err(|reason| PipelineError::SchemaInvalid {
        stage: "problem".into(),
        reason,
    })?;
    Ok(problem)
}

/// Cut `text` to at most `max` characters, preferring a paragraph
/// break, then a sentence end, then a word boundary. Falls back to a
/// hard cut on a char boundary.
pub fn truncate_at_boundary(text: &str, max: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max {
        return text.to_string();
    }
    let window: String = chars[..max].iter().collect();

    if let Some(pos) = window.rfind("\n\n") {
        if pos > 0 {
            return window[..pos].to_string();
        }
    }

    // Last sentence terminator followed by whitespace or at the cut.
    let bytes = window.as_bytes();
    let mut sentence_end = None;
    for (i, &b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?') {
            let at_break = match bytes.get(i + 1) {
                Some(&next) => next.is_ascii_whitespace(),
                None => true,
            };
            if at_break {
                sentence_end = Some(i + 1);
            }
        }
    }
    if let Some(end) = sentence_end {
        return window[..end].trim_end().to_string();
    }

    if let Some(pos) = window.rfind(char::is_whitespace) {
        if pos > 0 {
            return window[..pos].to_string();
        }
    }

    window
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_untouched() {
        assert_eq!(truncate_at_boundary("short", 2000), "short");
    }

    #[test]
    fn prefers_paragraph_break() {
        let text = format!("{}\n\n{}", "a".repeat(100), "b".repeat(3000));
        let cut = truncate_at_boundary(&text, 2000);
        assert_eq!(cut, "a".repeat(100));
    }

    #[test]
    fn falls_back_to_sentence_end() {
        let text = format!("First sentence. Second sentence. {}", "x".repeat(3000));
        let cut = truncate_at_boundary(&text, 2000);
        assert!(cut.ends_with("sentence."));
        assert!(cut.chars().count() <= 2000);
    }

    #[test]
    fn falls_back_to_word_boundary() {
        let text = "word ".repeat(1000);
        let cut = truncate_at_boundary(&text, 2000);
        assert!(cut.chars().count() <= 2000);
        assert!(cut.ends_with("word"));
    }

    #[test]
    fn hard_cut_respects_char_boundaries() {
        // No whitespace, no sentences, multi-byte chars.
        let text = "é".repeat(3000);
        let cut = truncate_at_boundary(&text, 2000);
        assert_eq!(cut.chars().count(), 2000);
    }

    #[test]
    fn exact_limit_is_untouched() {
        let text = "x".repeat(2000);
        assert_eq!(truncate_at_boundary(&text, 2000), text);
    }
}
