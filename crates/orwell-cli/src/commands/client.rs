use anyhow::Result;
use tokio::io::BufReader;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::watch;
use tracing::info;

use orwell_core::{AppConfig, ClientAgent, ClientArgs};

/// SIGINT, SIGTERM and SIGALRM, all of which end the client
struct ExitSignals {
    sigint: Signal,
    sigterm: Signal,
    sigalrm: Signal,
}

impl ExitSignals {
    /// Replaces the default actions, so register before anything needs cleanup
    fn register() -> std::io::Result<Self> {
        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sigalrm: signal(SignalKind::alarm())?,
        })
    }

    /// Raise the agent's shutdown flag on the first signal
    fn forward(mut self, shutdown_tx: watch::Sender<bool>) {
        tokio::spawn(async move {
            tokio::select! {
                _ = self.sigint.recv() => info!("Received SIGINT"),
                _ = self.sigterm.recv() => info!("Received SIGTERM"),
                _ = self.sigalrm.recv() => info!("Received SIGALRM"),
            }
            shutdown_tx.send_replace(true);
        });
    }
}

pub async fn run(args: ClientArgs, config: &AppConfig) -> Result<()> {
    let signals = ExitSignals::register()?;

    let input = BufReader::new(tokio::io::stdin());
    let agent = ClientAgent::setup(args, config, input)?;
    signals.forward(agent.shutdown_handle());

    agent.run().await?;

    // The runtime would otherwise wait on the blocking stdin reader
    std::process::exit(0);
}
