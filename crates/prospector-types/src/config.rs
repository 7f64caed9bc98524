//! Configuration schema and startup validation.
//!
//! Loaded from a JSON file. Every field has a serde default so a partial
//! config parses; [`Config::validate`] then collects every semantic
//! problem into one `ConfigInvalid` error rather than failing on the
//! first.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Root configuration for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ── Ingest ───────────────────────────────────────────────────────
    /// Forum namespaces to ingest from, in priority order.
    #[serde(default = "default_origins")]
    pub origins: Vec<String>,

    /// Minimum forum score for a post to be considered.
    #[serde(default = "default_min_score")]
    pub min_score: i64,

    /// Maximum posts fetched per origin per run.
    #[serde(default = "default_posts_per_origin")]
    pub posts_per_origin: usize,

    // ── Budgets ──────────────────────────────────────────────────────
    /// Token ceiling per orchestrator run (sent + received).
    #[serde(default = "default_max_tokens_per_run")]
    pub max_tokens_per_run: u64,

    /// Spend ceiling per orchestrator run, USD.
    #[serde(default = "default_max_usd_per_run")]
    pub max_usd_per_run: f64,

    /// Lifetime spend ceiling, USD.
    #[serde(default = "default_max_usd_lifetime")]
    pub max_usd_lifetime: f64,

    /// Price per input token, USD.
    #[serde(default = "default_price_in")]
    pub price_in_per_token: f64,

    /// Price per output token, USD.
    #[serde(default = "default_price_out")]
    pub price_out_per_token: f64,

    // ── Pipeline ─────────────────────────────────────────────────────
    /// Content regenerations allowed after the first attempt. The default
    /// of 1 means two total content attempts.
    #[serde(default = "default_max_regenerations")]
    pub max_regenerations: u32,

    /// When set, the orchestrator exits without calling any remote.
    #[serde(default)]
    pub kill_switch: bool,

    /// Model identifier passed to the LLM remote.
    #[serde(default = "default_model")]
    pub model: String,

    // ── Remotes ──────────────────────────────────────────────────────
    /// Base URL of the OpenAI-compatible LLM endpoint.
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    /// Environment variable holding the LLM API key.
    #[serde(default = "default_llm_api_key_env")]
    pub llm_api_key_env: String,

    /// Base URL of the forum API.
    #[serde(default = "default_forum_base_url")]
    pub forum_base_url: String,

    /// Base URL of the storefront API.
    #[serde(default = "default_storefront_base_url")]
    pub storefront_base_url: String,

    /// Environment variable holding the storefront access token.
    #[serde(default = "default_storefront_token_env")]
    pub storefront_token_env: String,

    /// Request deadline for LLM calls, seconds.
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Request deadline for forum calls, seconds.
    #[serde(default = "default_forum_timeout_secs")]
    pub forum_timeout_secs: u64,

    /// Request deadline for storefront calls, seconds.
    #[serde(default = "default_storefront_timeout_secs")]
    pub storefront_timeout_secs: u64,

    // ── Paths ────────────────────────────────────────────────────────
    /// Data directory root; holds the lockfile.
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    /// SQLite database file path.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Artifact tree root.
    #[serde(default = "default_artifacts_root")]
    pub artifacts_root: PathBuf,

    /// Optional prompt-template directory; compiled-in defaults are used
    /// when absent.
    #[serde(default)]
    pub prompts_dir: Option<PathBuf>,

    // ── Dashboard ────────────────────────────────────────────────────
    /// Dashboard listen port.
    #[serde(default = "default_dashboard_port")]
    pub dashboard_port: u16,
}

fn default_origins() -> Vec<String> {
    vec!["SideProject".into(), "Entrepreneur".into(), "startups".into()]
}
fn default_min_score() -> i64 {
    10
}
fn default_posts_per_origin() -> usize {
    20
}
fn default_max_tokens_per_run() -> u64 {
    50_000
}
fn default_max_usd_per_run() -> f64 {
    5.0
}
fn default_max_usd_lifetime() -> f64 {
    100.0
}
fn default_price_in() -> f64 {
    0.000_03
}
fn default_price_out() -> f64 {
    0.000_06
}
fn default_max_regenerations() -> u32 {
    1
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_llm_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_forum_base_url() -> String {
    "https://www.reddit.com".into()
}
fn default_storefront_base_url() -> String {
    "https://api.gumroad.com/v2".into()
}
fn default_storefront_token_env() -> String {
    "STOREFRONT_ACCESS_TOKEN".into()
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_forum_timeout_secs() -> u64 {
    30
}
fn default_storefront_timeout_secs() -> u64 {
    30
}
fn default_data_root() -> PathBuf {
    PathBuf::from("./data")
}
fn default_database_path() -> PathBuf {
    PathBuf::from("./data/pipeline.db")
}
fn default_artifacts_root() -> PathBuf {
    PathBuf::from("./data/artifacts")
}
fn default_dashboard_port() -> u16 {
    8000
}

impl Default for Config {
    fn default() -> Self {
        serde_json::from_str("{}").expect("empty config must deserialize")
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| PipelineError::ConfigInvalid {
            reasons: vec![format!("cannot read {}: {e}", path.display())],
        })?;
        let config: Config =
            serde_json::from_str(&raw).map_err(|e| PipelineError::ConfigInvalid {
                reasons: vec![format!("cannot parse {}: {e}", path.display())],
            })?;
        Ok(config)
    }

    /// Semantic validation. Collects every problem found.
    pub fn validate(&self) -> Result<()> {
        let mut reasons = Vec::new();

        if self.origins.is_empty() {
            reasons.push("origins must not be empty".to_string());
        }
        if self.origins.iter().any(|o| o.trim().is_empty()) {
            reasons.push("origins must not contain blank entries".to_string());
        }
        if self.posts_per_origin == 0 {
            reasons.push("posts_per_origin must be at least 1".to_string());
        }
        if self.max_tokens_per_run == 0 {
            reasons.push("max_tokens_per_run must be positive".to_string());
        }
        if self.max_usd_per_run <= 0.0 {
            reasons.push("max_usd_per_run must be positive".to_string());
        }
        if self.max_usd_lifetime <= 0.0 {
            reasons.push("max_usd_lifetime must be positive".to_string());
        }
        if self.max_usd_per_run > self.max_usd_lifetime {
            reasons.push("max_usd_per_run must not exceed max_usd_lifetime".to_string());
        }
        if self.price_in_per_token <= 0.0 || self.price_out_per_token <= 0.0 {
            reasons.push("token prices must be positive".to_string());
        }
        if self.max_regenerations > 10 {
            reasons.push("max_regenerations above 10 is almost certainly a mistake".to_string());
        }
        if self.model.trim().is_empty() {
            reasons.push("model must not be empty".to_string());
        }
        if self.llm_base_url.trim().is_empty() {
            reasons.push("llm_base_url must not be empty".to_string());
        }
        if self.dashboard_port == 0 {
            reasons.push("dashboard_port must not be 0".to_string());
        }
        if self.database_path.as_os_str().is_empty() {
            reasons.push("database_path must not be empty".to_string());
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::ConfigInvalid { reasons })
        }
    }

    /// Path of the orchestrator PID lockfile.
    pub fn lock_path(&self) -> PathBuf {
        self.data_root.join("pid.lock")
    }

    /// Path of the kill-switch flag file, checked alongside the config
    /// boolean at startup and between posts.
    pub fn kill_switch_path(&self) -> PathBuf {
        self.data_root.join("kill.switch")
    }

    /// Backup directory under the artifact tree.
    pub fn backups_dir(&self) -> PathBuf {
        self.artifacts_root.join("backups")
    }
}
