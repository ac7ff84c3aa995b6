//! Local web bridge command — `postbridge serve`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use postbridge::config::BridgeConfig;
use postbridge::web::api::AppState;
use postbridge::web::server::{ServerConfig, start_server};

pub async fn cmd_serve(config: BridgeConfig, host: String, port: u16, open: bool) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let state = AppState::from_config(&config).context("Failed to build API clients")?;

    // Spawn browser open before starting the server (which blocks)
    if open {
        let url = format!("http://localhost:{}", port);
        tokio::spawn(async move {
            // Small delay to let the server start binding
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
            if let Err(e) = open::that(&url) {
                warn!(error = %e, "failed to open browser");
            }
        });
    }

    start_server(ServerConfig { host, port }, Arc::new(state)).await
}
