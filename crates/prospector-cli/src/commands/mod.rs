//! Subcommand implementations.

pub mod backup;
pub mod dashboard;
pub mod run;
pub mod status;

use std::path::Path;

use prospector_types::{Config, PipelineError};

/// Load and validate the configuration; report every problem found.
pub fn load_config(path: &Path) -> Result<Config, u8> {
    let config = match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            report_config_error(&e);
            return Err(2);
        }
    };
    if let Err(e) = config.validate() {
        report_config_error(&e);
        return Err(2);
    }
    Ok(config)
}

fn report_config_error(err: &PipelineError) {
    eprintln!("configuration error:");
    if let PipelineError::ConfigInvalid { reasons } = err {
        for reason in reasons {
            eprintln!("  - {reason}");
        }
    } else {
        eprintln!("  - {err}");
    }
}

/// Map a pipeline error to the process exit code.
pub fn exit_code_for(err: &PipelineError) -> u8 {
    err.exit_code() as u8
}
