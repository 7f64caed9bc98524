//! `prospector status` -- configuration, spend, and backup summary.

use std::path::Path;

use prospector_core::Orchestrator;
use prospector_store::{BackupManager, Store};

pub fn run(config_path: &Path) -> u8 {
    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    println!("config: {}", config_path.display());
    println!("  database:        {}", config.database_path.display());
    println!("  artifacts:       {}", config.artifacts_root.display());
    println!("  model:           {}", config.model);
    println!("  origins:         {}", config.origins.join(", "));
    println!(
        "  budgets:         {} tokens/run, ${}/run, ${} lifetime",
        config.max_tokens_per_run, config.max_usd_per_run, config.max_usd_lifetime
    );
    println!(
        "  kill switch:     {}",
        if Orchestrator::kill_switch_engaged(&config) {
            "ENGAGED"
        } else {
            "off"
        }
    );
    println!(
        "  orchestrator:    {}",
        if config.lock_path().exists() {
            "running (lock present)"
        } else {
            "idle"
        }
    );

    match Store::open(&config.database_path) {
        Ok(store) => match store.lifetime_spend() {
            Ok(spend) => println!("  lifetime spend:  ${spend:.4}"),
            Err(e) => println!("  lifetime spend:  unavailable ({e})"),
        },
        Err(e) => println!("  store:           unavailable ({e})"),
    }

    let manager = BackupManager::new(&config.backups_dir());
    match manager.status() {
        Ok(status) => {
            println!(
                "  backups:         {} ({} bytes), newest: {}",
                status.count,
                status.total_bytes,
                status.newest.as_deref().unwrap_or("none")
            );
        }
        Err(e) => println!("  backups:         unavailable ({e})"),
    }

    0
}
