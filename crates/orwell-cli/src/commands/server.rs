use anyhow::Result;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::info;

use orwell_core::{AppConfig, LoggerServer};

/// Run the logging daemon until SIGINT or SIGTERM
pub async fn run(config: &AppConfig) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        info!("Received shutdown signal");
        let _ = shutdown_tx_clone.send(true);
    });

    let server = LoggerServer::new(config);
    server.run(shutdown_rx).await?;

    drop(shutdown_tx);
    Ok(())
}
