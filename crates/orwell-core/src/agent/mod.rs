//! Pane client agent
//!
//! Relays one command per connection from its input to the daemon,
//! reconnecting after every command until shutdown is raised.

mod marker;
mod watchdog;

pub use marker::InstanceMarker;
pub use watchdog::{process_exists, spawn_watchdog, LivenessCheck};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

use crate::config::AppConfig;
use crate::ipc::protocol::{is_end_of_command, outgoing_line};
use crate::ipc::{connect, LoggerConnection};
use crate::{Error, Result};

/// Positional client arguments
#[derive(Debug, Clone)]
pub struct ClientArgs {
    pub session: String,
    pub token1: String,
    pub token2: String,
    pub pane_pid: u32,
}

/// How forwarding of one command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// End-of-command sentinel seen
    Completed,
    /// Daemon stopped accepting data
    PeerGone,
    /// Shutdown raised while waiting for input
    Cancelled,
    /// Input reached EOF
    InputClosed,
}

pub struct ClientAgent<R> {
    args: ClientArgs,
    socket_path: PathBuf,
    retry_interval: Duration,
    input: R,
    marker: InstanceMarker,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    watchdog: JoinHandle<()>,
}

impl<R: AsyncBufRead + Unpin> ClientAgent<R> {
    /// Write the instance marker and start watching the pane process
    pub fn setup(args: ClientArgs, config: &AppConfig, input: R) -> Result<Self> {
        Self::setup_with_check(args, config, input, Arc::new(process_exists))
    }

    pub fn setup_with_check(
        args: ClientArgs,
        config: &AppConfig,
        input: R,
        is_alive: LivenessCheck,
    ) -> Result<Self> {
        let marker_path = config.marker_path(&args.session, &args.token1, &args.token2);
        let marker = InstanceMarker::create(marker_path)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watchdog = spawn_watchdog(
            args.pane_pid,
            config.client.watchdog_interval(),
            is_alive,
            shutdown_tx.clone(),
        );

        info!("Client set up at {}", marker.path().display());

        Ok(Self {
            args,
            socket_path: config.socket_path(),
            retry_interval: config.client.retry_interval(),
            input,
            marker,
            shutdown_tx,
            shutdown_rx,
            watchdog,
        })
    }

    /// Sender that stops the agent when `true` is sent
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    pub fn marker_path(&self) -> &std::path::Path {
        self.marker.path()
    }

    /// Connect, relay, repeat. Returns after cleanup once shutdown is raised or input ends.
    pub async fn run(mut self) -> Result<()> {
        info!("Client started for session {}", self.args.session);

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            let connected = tokio::select! {
                result = connect(&self.socket_path, &self.args.session) => result,
                _ = self.shutdown_rx.wait_for(|stop| *stop) => break,
            };

            let failed = match connected {
                Ok(conn) => {
                    let span = info_span!("conn", uuid = %conn.uuid());
                    match self.read_and_send(conn).instrument(span).await {
                        StreamOutcome::Completed => {
                            info!("Command relayed");
                            false
                        }
                        StreamOutcome::PeerGone => true,
                        StreamOutcome::Cancelled | StreamOutcome::InputClosed => break,
                    }
                }
                Err(e @ Error::EndpointUnavailable { .. }) => {
                    warn!("Server seems not running: {}", e);
                    true
                }
                Err(e) => {
                    warn!("Connection failed: {}", e);
                    true
                }
            };

            if failed {
                tokio::select! {
                    _ = tokio::time::sleep(self.retry_interval) => {}
                    _ = self.shutdown_rx.wait_for(|stop| *stop) => break,
                }
            }
        }

        self.terminate();
        Ok(())
    }

    /// Forward input lines until the end-of-command sentinel.
    async fn read_and_send(&mut self, mut conn: LoggerConnection) -> StreamOutcome {
        info!("Transmission begin");

        let mut index = 0;
        let outcome = loop {
            let mut line = Vec::new();
            let read = tokio::select! {
                read = self.input.read_until(b'\n', &mut line) => read,
                _ = self.shutdown_rx.wait_for(|stop| *stop) => break StreamOutcome::Cancelled,
            };

            match read {
                Ok(0) => {
                    info!("Input closed");
                    break StreamOutcome::InputClosed;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed to read input: {}", e);
                    break StreamOutcome::InputClosed;
                }
            }

            if is_end_of_command(&line) {
                break StreamOutcome::Completed;
            }

            if let Err(e) = conn.send(outgoing_line(index, &line)).await {
                warn!("Abandoning command: {}", e);
                break StreamOutcome::PeerGone;
            }
            index += 1;
        };

        conn.close().await;
        info!("Transmission end");
        outcome
    }

    fn terminate(self) {
        self.watchdog.abort();
        self.marker.remove();
        info!("Client exited");
    }
}
