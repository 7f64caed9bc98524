//! # prospector-llm
//!
//! Transport layer for the pipeline's three remotes. Contains:
//!
//! - **[`error`]** -- [`RemoteError`] and the transient/terminal split
//! - **[`types`]** -- OpenAI-format chat request/response wire types
//! - **[`provider`]** -- the [`Provider`] trait all LLM backends implement
//! - **[`openai_compat`]** -- reqwest provider for OpenAI-compatible APIs
//! - **[`retry`]** -- per-remote exponential backoff with jitter
//!
//! Budget enforcement does not live here; the gateway in
//! `prospector-core` consults the cost governor before any call reaches
//! this crate.

pub mod error;
pub mod openai_compat;
pub mod provider;
pub mod retry;
pub mod types;

pub use error::{RemoteError, Result};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::Provider;
pub use retry::{BackoffConfig, RemoteKind, RetryPolicy};
pub use types::{ChatMessage, ChatRequest, ChatResponse, Usage};
