//! Contextual input cleansing.
//!
//! Three contexts, each a pure function:
//!
//! - [`ingress`] -- forum content before it reaches any prompt
//! - [`listing`] -- generated content before it reaches the storefront
//! - [`store_text`] / [`store_bytes`] -- external text before a
//!   database write
//!
//! Each pass is applied to a fixpoint where needed so every function is
//! idempotent: sanitizing already-sanitized text is a no-op.

use std::sync::LazyLock;

use regex::Regex;

/// Element blocks whose content must not survive into a listing.
static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("script block pattern")
});

/// Opening or closing tags of elements that have no business in a
/// product listing.
static DANGEROUS_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:script|iframe|object|embed|form|base)[^>]*>")
        .expect("dangerous tag pattern")
});

/// Inline event handlers (`onclick=...`, `onerror='...'`).
static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s*\bon\w+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#)
        .expect("event handler pattern")
});

/// `javascript:` URL scheme, with optional embedded whitespace.
static JAVASCRIPT_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)j\s*a\s*v\s*a\s*s\s*c\s*r\s*i\s*p\s*t\s*:").expect("javascript scheme pattern"));

/// `data:text/html` URL scheme.
static DATA_HTML_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)data\s*:\s*text\s*/\s*html").expect("data html scheme pattern")
});

/// A well-formed character entity right after a `&`.
static ENTITY_AT_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&(?:[a-zA-Z][a-zA-Z0-9]{1,31}|#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6});")
        .expect("entity pattern")
});

// ── Ingress ──────────────────────────────────────────────────────────

/// Cleanse forum content before prompt injection: decode HTML entities,
/// strip every ASCII control character except LF, drop NUL. Meaningful
/// punctuation is untouched. Applied to a fixpoint, so double
/// application changes nothing.
pub fn ingress(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..8 {
        let next = strip_controls(&decode_entities(&current));
        if next == current {
            return current;
        }
        current = next;
    }
    current
}

/// Remove ASCII control characters (0x00-0x1F except LF, plus 0x7F).
fn strip_controls(text: &str) -> String {
    text.chars()
        .filter(|&c| c == '\n' || (c >= '\u{20}' && c != '\u{7F}'))
        .collect()
}

/// Decode the common named entities plus numeric forms.
fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match decode_one_entity(rest) {
            Some((decoded, consumed)) => {
                out.push(decoded);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode the entity at the start of `s`, returning the character and
/// the byte length consumed.
fn decode_one_entity(s: &str) -> Option<(char, usize)> {
    let m = ENTITY_AT_START.find(s)?;
    let body = &s[1..m.end() - 1];
    let decoded = match body {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            if let Some(digits) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                u32::from_str_radix(digits, 16).ok().and_then(char::from_u32)
            } else if let Some(digits) = body.strip_prefix('#') {
                digits.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                // Unknown named entity: leave it alone.
                None
            }
        }
    };
    decoded.map(|c| (c, m.end()))
}

// ── Listing ──────────────────────────────────────────────────────────

/// Cleanse generated content before it is sent to the storefront.
///
/// Removes script blocks and dangerous element tags, strips inline
/// event handlers, neutralizes `javascript:` and `data:text/html`
/// schemes, then entity-escapes what remains. Existing entities are
/// preserved so the function is idempotent.
pub fn listing(text: &str) -> String {
    let stripped = SCRIPT_BLOCK.replace_all(text, "");
    let stripped = DANGEROUS_TAG.replace_all(&stripped, "");
    let stripped = EVENT_HANDLER.replace_all(&stripped, "");
    let stripped = JAVASCRIPT_SCHEME.replace_all(&stripped, "blocked:");
    let stripped = DATA_HTML_SCHEME.replace_all(&stripped, "blocked:text-html");
    escape_preserving_entities(&stripped)
}

/// Escape `<`, `>`, `"`, and bare `&`. An `&` that already begins a
/// well-formed entity passes through unchanged.
fn escape_preserving_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        let rest = &text[i..];
        let c = rest.chars().next().expect("in-bounds char");
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '&' => {
                if ENTITY_AT_START.is_match(rest) {
                    out.push('&');
                } else {
                    out.push_str("&amp;");
                }
            }
            _ => out.push(c),
        }
        i += c.len_utf8();
    }
    out
}

// ── Store ────────────────────────────────────────────────────────────

/// Error from the storage sanitization context.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SanitizeError {
    /// The byte stream is not valid UTF-8.
    #[error("invalid utf-8 at byte {position}")]
    InvalidUtf8 {
        /// Offset of the first invalid byte.
        position: usize,
    },
}

/// Cleanse text for a database write: strip NUL.
pub fn store_text(text: &str) -> String {
    text.replace('\0', "")
}

/// Validate a byte stream as UTF-8 and cleanse it for a database write.
/// Invalid sequences are rejected, not replaced.
pub fn store_bytes(bytes: &[u8]) -> Result<String, SanitizeError> {
    let text = std::str::from_utf8(bytes).map_err(|e| SanitizeError::InvalidUtf8 {
        position: e.valid_up_to(),
    })?;
    Ok(store_text(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── ingress ─────────────────────────────────────────────────────

    #[test]
    fn ingress_noop_on_clean_input() {
        let clean = "A plain paragraph, with punctuation! And a\nsecond line.";
        assert_eq!(ingress(clean), clean);
    }

    #[test]
    fn ingress_strips_controls_keeps_lf() {
        let dirty = "a\x00b\x01c\x1fd\x7fe\nf\tg\rh";
        assert_eq!(ingress(dirty), "abcde\nfgh");
    }

    #[test]
    fn ingress_decodes_entities() {
        assert_eq!(ingress("Tom &amp; Jerry &lt;3"), "Tom & Jerry <3");
        assert_eq!(ingress("it&#39;s &quot;quoted&quot;"), "it's \"quoted\"");
        assert_eq!(ingress("snowman: &#x2603;"), "snowman: \u{2603}");
    }

    #[test]
    fn ingress_leaves_unknown_entities() {
        assert_eq!(ingress("&bogus; stays"), "&bogus; stays");
    }

    #[test]
    fn ingress_is_idempotent() {
        let samples = [
            "plain text",
            "Tom &amp; Jerry",
            "&amp;lt; double encoded",
            "control\x01chars\x00here",
            "&am\x01p; interleaved",
        ];
        for s in samples {
            let once = ingress(s);
            assert_eq!(ingress(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn ingress_decoded_controls_are_stripped() {
        // A numeric entity decoding to a control character must not
        // survive the pass.
        assert_eq!(ingress("a&#0;b&#13;c"), "abc");
    }

    #[test]
    fn ingress_preserves_punctuation() {
        let text = "Don't touch: commas, semicolons; dashes - or (parens)!";
        assert_eq!(ingress(text), text);
    }

    // ── listing ─────────────────────────────────────────────────────

    #[test]
    fn listing_removes_script_block_entirely() {
        let out = listing("before<script>alert('xss')</script>after");
        assert!(!out.to_lowercase().contains("<script"));
        assert!(!out.contains("alert"));
        assert!(out.contains("before"));
        assert!(out.contains("after"));
    }

    #[test]
    fn listing_neutralizes_onerror_attribute() {
        let out = listing(r#"<img src=x onerror=alert(1)>"#);
        assert!(!out.to_lowercase().contains("onerror"));
        assert!(!out.contains('<'));
    }

    #[test]
    fn listing_neutralizes_javascript_url() {
        let out = listing(r#"<a href="javascript:alert(1)">click</a>"#);
        assert!(!out.to_lowercase().contains("javascript:"));
        assert!(out.contains("blocked:"));
    }

    #[test]
    fn listing_neutralizes_data_html_url() {
        let out = listing("go to data:text/html,<script>x</script> now");
        assert!(!out.to_lowercase().contains("data:text/html"));
    }

    #[test]
    fn listing_removes_iframe_and_base() {
        let out = listing(r#"<iframe src="https://evil.example"></iframe><base href="/x">"#);
        assert!(!out.to_lowercase().contains("iframe"));
        assert!(!out.to_lowercase().contains("base"));
    }

    #[test]
    fn listing_removes_object_embed_form() {
        let out = listing("<object data=x></object><embed src=y><form action=z></form>");
        for tag in ["object", "embed", "form"] {
            assert!(!out.to_lowercase().contains(tag), "tag {tag} survived: {out}");
        }
    }

    #[test]
    fn listing_escapes_remaining_markup() {
        let out = listing("<b>bold</b> & \"quotes\"");
        assert_eq!(out, "&lt;b&gt;bold&lt;/b&gt; &amp; &quot;quotes&quot;");
    }

    #[test]
    fn listing_is_idempotent() {
        let corpus = [
            "plain product copy",
            "<script>alert('xss')</script>",
            r#"<img src=x onerror=alert(1)>"#,
            r#"<a href="javascript:alert(1)">click</a>"#,
            "data:text/html,<h1>x</h1>",
            r#"<iframe src="https://evil.example"></iframe>"#,
            r#"<base href="https://evil.example/">"#,
            "markdown **stays** mostly `intact`",
        ];
        for s in corpus {
            let once = listing(s);
            assert_eq!(listing(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn listing_preserves_markdown_text() {
        let out = listing("# Heading\n\n- item one\n- item two\n\n**bold** text");
        assert!(out.contains("# Heading"));
        assert!(out.contains("**bold** text"));
    }

    // ── store ───────────────────────────────────────────────────────

    #[test]
    fn store_text_strips_nul() {
        assert_eq!(store_text("a\0b\0"), "ab");
    }

    #[test]
    fn store_text_noop_on_clean() {
        assert_eq!(store_text("clean"), "clean");
    }

    #[test]
    fn store_bytes_accepts_valid_utf8() {
        assert_eq!(store_bytes("héllo\0".as_bytes()).unwrap(), "héllo");
    }

    #[test]
    fn store_bytes_rejects_invalid_utf8() {
        let err = store_bytes(&[0x61, 0x62, 0xff, 0x63]).unwrap_err();
        assert_eq!(err, SanitizeError::InvalidUtf8 { position: 2 });
        assert!(err.to_string().contains("byte 2"));
    }
}
