//! OpenAI-compatible provider implementation.
//!
//! [`OpenAiCompatProvider`] works with any API that follows the OpenAI
//! chat completion format; the endpoint is chosen by `base_url`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{RemoteError, Result};
use crate::provider::Provider;
use crate::types::{ChatRequest, ChatResponse};

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct LlmEndpoint {
    /// Base URL, e.g. "https://api.openai.com/v1".
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Request deadline.
    pub timeout: Duration,
}

/// An LLM provider that speaks the OpenAI chat completion API.
pub struct OpenAiCompatProvider {
    endpoint: LlmEndpoint,
    http: reqwest::Client,
    api_key: Option<String>,
}

impl OpenAiCompatProvider {
    /// Create a provider; the API key is resolved from the configured
    /// environment variable at request time.
    pub fn new(endpoint: LlmEndpoint) -> Self {
        let http = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .unwrap_or_default();
        Self {
            endpoint,
            http,
            api_key: None,
        }
    }

    /// Create a provider with an explicit API key, bypassing the
    /// environment lookup.
    pub fn with_api_key(endpoint: LlmEndpoint, api_key: String) -> Self {
        let mut provider = Self::new(endpoint);
        provider.api_key = Some(api_key);
        provider
    }

    fn completions_url(&self) -> String {
        let base = self.endpoint.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    /// Resolve the API key: explicit key > environment variable.
    fn resolve_api_key(&self) -> Result<String> {
        if let Some(ref key) = self.api_key {
            return Ok(key.clone());
        }
        std::env::var(&self.endpoint.api_key_env).map_err(|_| {
            RemoteError::AuthFailed(format!("set {} env var", self.endpoint.api_key_env))
        })
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let api_key = self.resolve_api_key()?;
        let url = self.completions_url();

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteError::Timeout
                } else {
                    RemoteError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                warn!(body = %body, "llm remote rate limited");
            }
            return Err(RemoteError::from_status(status.as_u16(), body));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("failed to parse response: {e}")))?;

        debug!(
            model = %chat_response.model,
            choices = chat_response.choices.len(),
            "chat completion response received"
        );

        Ok(chat_response)
    }
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("base_url", &self.endpoint.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}
