use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use tracing::{error, info};

use tidescale_core::TideConfig;

use crate::daemon::Daemon;

pub async fn run(config_path: &Path, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "tidescale daemon starting");

    let config = TideConfig::from_file(config_path)?
        .resolve()
        .with_context(|| format!("invalid config {}", config_path.display()))?;
    let listen = listen.unwrap_or(config.listen);

    let daemon = Daemon::from_config(&config)?;
    daemon.serve(listen, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a handler the daemon can only be killed; keep serving.
        error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
