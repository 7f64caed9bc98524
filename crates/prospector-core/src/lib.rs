//! # prospector-core
//!
//! The pipeline's moving parts:
//!
//! - **[`governor`]** -- pre-call budget gate and post-call accounting
//! - **[`gateway`]** -- estimate/check/execute/record front over the LLM
//! - **[`sanitize`]** -- contextual input cleansing
//! - **[`prompts`]** -- per-stage prompt templates
//! - **[`remotes`]** -- forum and storefront client traits + HTTP impls
//! - **[`agents`]** -- the six stage transformers
//! - **[`orchestrator`]** -- the per-post stage machine
//! - **[`lock`]** -- single-instance PID lockfile

pub mod agents;
pub mod gateway;
pub mod governor;
pub mod lock;
pub mod orchestrator;
pub mod prompts;
pub mod remotes;
pub mod sanitize;

pub use gateway::ModelGateway;
pub use governor::{CostGovernor, RunStats};
pub use lock::PidLock;
pub use orchestrator::{Orchestrator, RunSummary};
pub use prompts::PromptSet;
