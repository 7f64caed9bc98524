//! Remote error types and the transient/terminal classification.
//!
//! All three remotes (LLM, forum, storefront) surface failures as
//! [`RemoteError`] so one retry policy can classify them uniformly.

use thiserror::Error;

/// Errors from a remote HTTP service.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The HTTP request failed with a status not covered by a more
    /// specific variant. The message starts with `HTTP <code>:`.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Authentication was rejected (HTTP 401/403).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The remote is throttling requests (HTTP 429).
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested wait before retrying, in milliseconds.
        retry_after_ms: u64,
    },

    /// The requested resource does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote rejected the request semantically (HTTP 400/422).
    #[error("unprocessable: {0}")]
    Unprocessable(String),

    /// The remote returned a body that could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request exceeded its deadline.
    #[error("timeout")]
    Timeout,

    /// An HTTP-level error from reqwest (connect failures, resets).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RemoteError {
    /// Map an HTTP status + body to the right variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => RemoteError::AuthFailed(body),
            404 => RemoteError::NotFound(body),
            400 | 422 => RemoteError::Unprocessable(body),
            429 => RemoteError::RateLimited {
                retry_after_ms: parse_retry_after_ms(&body).unwrap_or(1000),
            },
            _ => RemoteError::RequestFailed(format!("HTTP {status}: {body}")),
        }
    }

    /// Whether the failure is worth retrying: timeouts, connection
    /// errors, 429, and 5xx. Auth failures, missing resources, semantic
    /// rejections, and unparseable responses are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::RateLimited { .. } => true,
            RemoteError::Timeout => true,
            RemoteError::Http(e) => {
                // reqwest timeouts and transport errors are transient; a
                // status captured by error_for_status follows the code.
                if let Some(status) = e.status() {
                    let code = status.as_u16();
                    code == 429 || (500..=599).contains(&code)
                } else {
                    true
                }
            }
            RemoteError::RequestFailed(msg) => {
                msg.starts_with("HTTP 500")
                    || msg.starts_with("HTTP 502")
                    || msg.starts_with("HTTP 503")
                    || msg.starts_with("HTTP 504")
            }
            RemoteError::AuthFailed(_)
            | RemoteError::NotFound(_)
            | RemoteError::Unprocessable(_)
            | RemoteError::InvalidResponse(_)
            | RemoteError::Json(_) => false,
        }
    }
}

/// Try to extract a retry-after value from a JSON error response body.
fn parse_retry_after_ms(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("retry_after_ms")
        .and_then(|v| v.as_u64())
        .or_else(|| {
            value
                .get("retry_after")
                .and_then(|v| v.as_f64())
                .map(|secs| (secs * 1000.0) as u64)
        })
}

/// A convenience type alias for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            RemoteError::from_status(401, "bad key".into()),
            RemoteError::AuthFailed(_)
        ));
        assert!(matches!(
            RemoteError::from_status(403, String::new()),
            RemoteError::AuthFailed(_)
        ));
        assert!(matches!(
            RemoteError::from_status(404, String::new()),
            RemoteError::NotFound(_)
        ));
        assert!(matches!(
            RemoteError::from_status(400, String::new()),
            RemoteError::Unprocessable(_)
        ));
        assert!(matches!(
            RemoteError::from_status(422, String::new()),
            RemoteError::Unprocessable(_)
        ));
        assert!(matches!(
            RemoteError::from_status(429, String::new()),
            RemoteError::RateLimited { .. }
        ));
        assert!(matches!(
            RemoteError::from_status(503, String::new()),
            RemoteError::RequestFailed(_)
        ));
    }

    #[test]
    fn rate_limited_parses_retry_after_ms() {
        let err = RemoteError::from_status(429, r#"{"retry_after_ms": 2500}"#.into());
        match err {
            RemoteError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, 2500),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rate_limited_parses_retry_after_seconds() {
        let err = RemoteError::from_status(429, r#"{"retry_after": 1.5}"#.into());
        match err {
            RemoteError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, 1500),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rate_limited_default_backoff() {
        let err = RemoteError::from_status(429, "not json".into());
        match err {
            RemoteError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, 1000),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn transient_classification() {
        assert!(RemoteError::Timeout.is_transient());
        assert!(RemoteError::RateLimited { retry_after_ms: 1 }.is_transient());
        for code in [500, 502, 503, 504] {
            assert!(
                RemoteError::RequestFailed(format!("HTTP {code}: oops")).is_transient(),
                "HTTP {code} must be transient"
            );
        }
    }

    #[test]
    fn terminal_classification() {
        assert!(!RemoteError::AuthFailed("nope".into()).is_transient());
        assert!(!RemoteError::NotFound("gone".into()).is_transient());
        assert!(!RemoteError::Unprocessable("bad field".into()).is_transient());
        assert!(!RemoteError::InvalidResponse("not json".into()).is_transient());
        assert!(!RemoteError::RequestFailed("HTTP 418: teapot".into()).is_transient());
    }
}
