use anyhow::{Context, Result};
use std::sync::Arc;
use syncwarden_core::config::Config;

/// Start the control API, blocking until shutdown.
pub fn run(mut config: Config, bind: Option<&str>, port: Option<u16>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind.to_string();
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let bind_addr = config.server.bind.clone();
    let port = config.server.port;

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(syncwarden_http::run_http_server(
        Arc::new(config),
        &bind_addr,
        port,
    ))
    .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
}
