//! `prospector run` -- one orchestrator run.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use prospector_core::governor::{Budgets, CostGovernor};
use prospector_core::remotes::{HttpForumClient, HttpStorefrontClient};
use prospector_core::{ModelGateway, Orchestrator, PidLock, PromptSet};
use prospector_llm::openai_compat::{LlmEndpoint, OpenAiCompatProvider};
use prospector_llm::{Provider, RetryPolicy};
use prospector_store::{ArtifactStore, Store};
use prospector_types::Config;

pub async fn run(config_path: &Path) -> u8 {
    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    // Kill switch observed at startup: exit before any remote is
    // touched.
    if Orchestrator::kill_switch_engaged(&config) {
        info!("kill switch engaged; exiting without side effects");
        return 4;
    }

    let _lock = match PidLock::acquire(&config.lock_path()) {
        Ok(lock) => lock,
        Err(e) => {
            error!(error = %e, "cannot acquire orchestrator lock");
            return super::exit_code_for(&e);
        }
    };

    match execute(&config).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "run failed");
            super::exit_code_for(&e)
        }
    }
}

async fn execute(config: &Config) -> prospector_types::Result<u8> {
    let store = Arc::new(Store::open(&config.database_path)?);
    let artifacts = ArtifactStore::open(&config.artifacts_root)?;
    let prompts = PromptSet::load(config.prompts_dir.as_deref())?;

    let run_id = chrono::Utc::now().timestamp();
    let governor = Arc::new(CostGovernor::new(
        Arc::clone(&store),
        run_id,
        config.model.clone(),
        Budgets {
            max_tokens_per_run: config.max_tokens_per_run,
            max_usd_per_run: config.max_usd_per_run,
            max_usd_lifetime: config.max_usd_lifetime,
            price_in_per_token: config.price_in_per_token,
            price_out_per_token: config.price_out_per_token,
        },
    )?);

    let provider = Arc::new(OpenAiCompatProvider::new(LlmEndpoint {
        base_url: config.llm_base_url.clone(),
        api_key_env: config.llm_api_key_env.clone(),
        timeout: Duration::from_secs(config.llm_timeout_secs),
    })) as Arc<dyn Provider>;

    let retry = RetryPolicy::new();
    let gateway = ModelGateway::new(
        provider,
        Arc::clone(&governor),
        retry.clone(),
        config.model.clone(),
    );

    let forum = Arc::new(HttpForumClient::new(
        config.forum_base_url.clone(),
        Duration::from_secs(config.forum_timeout_secs),
    ));
    let storefront = Arc::new(HttpStorefrontClient::new(
        config.storefront_base_url.clone(),
        config.storefront_token_env.clone(),
        Duration::from_secs(config.storefront_timeout_secs),
    ));

    let orchestrator = Orchestrator::new(
        config.clone(),
        store,
        artifacts,
        governor,
        gateway,
        prompts,
        forum,
        storefront,
        retry,
    );

    let summary = orchestrator.run().await?;
    info!(
        run_id = summary.run_id,
        ingested = summary.ingested,
        processed = summary.processed,
        uploaded = summary.uploaded,
        "run summary"
    );
    Ok(summary.exit_code() as u8)
}
