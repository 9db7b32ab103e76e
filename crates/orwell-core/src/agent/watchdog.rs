//! Pane liveness watchdog
//!
//! Polls the pane process and raises the agent's shutdown flag once it is gone.

use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Answers whether a process id is still alive
pub type LivenessCheck = Arc<dyn Fn(u32) -> bool + Send + Sync>;

/// Check process existence with `kill(pid, 0)`
pub fn process_exists(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // Exists, but owned by someone else
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Poll `pid` every `interval` until it disappears or shutdown is raised elsewhere.
///
/// Raises shutdown at most once, then stops.
pub fn spawn_watchdog(
    pid: u32,
    interval: Duration,
    is_alive: LivenessCheck,
    shutdown_tx: watch::Sender<bool>,
) -> JoinHandle<()> {
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        debug!("Watching pane process {} every {:?}", pid, interval);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown_rx.wait_for(|stop| *stop) => return,
            }

            if !is_alive(pid) {
                info!("Pane process {} exited", pid);
                shutdown_tx.send_replace(true);
                return;
            }
        }
    })
}
