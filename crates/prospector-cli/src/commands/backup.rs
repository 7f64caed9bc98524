//! `prospector backup` -- snapshot management.

use std::path::Path;

use tracing::error;

use prospector_store::{BackupManager, Store};

pub fn create(config_path: &Path) -> u8 {
    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let store = match Store::open(&config.database_path) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "cannot open store");
            return 1;
        }
    };

    let manager = BackupManager::new(&config.backups_dir());
    match manager.snapshot(&store) {
        Ok(path) => {
            println!("{}", path.display());
            0
        }
        Err(e) => {
            error!(error = %e, "snapshot failed");
            1
        }
    }
}

pub fn list(config_path: &Path) -> u8 {
    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let manager = BackupManager::new(&config.backups_dir());
    match manager.list() {
        Ok(snapshots) => {
            for snapshot in snapshots {
                println!("{}", snapshot.display());
            }
            0
        }
        Err(e) => {
            error!(error = %e, "cannot list snapshots");
            1
        }
    }
}

pub fn restore(config_path: &Path, snapshot: &Path) -> u8 {
    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    // Never restore under a live orchestrator.
    if config.lock_path().exists() {
        error!(lock = %config.lock_path().display(), "orchestrator lock present; refusing restore");
        return 3;
    }

    let manager = BackupManager::new(&config.backups_dir());
    match manager.restore(snapshot, &config.database_path) {
        Ok(()) => {
            println!("restored {}", snapshot.display());
            0
        }
        Err(e) => {
            error!(error = %e, "restore failed");
            1
        }
    }
}
