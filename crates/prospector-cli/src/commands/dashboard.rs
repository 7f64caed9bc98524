//! `prospector dashboard` -- serve the read-only dashboard.

use std::path::Path;

use tracing::error;

use prospector_dashboard::DashboardState;

pub async fn run(config_path: &Path, port_override: Option<u16>) -> u8 {
    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let state = match DashboardState::new(&config) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "cannot open store read-only (has the pipeline run yet?)");
            return 1;
        }
    };

    let port = port_override.unwrap_or(config.dashboard_port);
    match prospector_dashboard::serve(state, port).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "dashboard server failed");
            1
        }
    }
}
