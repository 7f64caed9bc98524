//! The [`Provider`] trait for LLM chat completions.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChatRequest, ChatResponse};

/// A backend that can execute chat completion requests.
///
/// Implementations handle protocol details (authentication, request
/// formatting, response parsing) for a specific API. The production
/// implementation is [`OpenAiCompatProvider`](crate::openai_compat::OpenAiCompatProvider);
/// tests substitute scripted mocks.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name for logging (e.g. "openai").
    fn name(&self) -> &str;

    /// Execute one chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`](crate::error::RemoteError) on network
    /// failures, auth rejection, rate limiting, or unparseable responses.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;
}
