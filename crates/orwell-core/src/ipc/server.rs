//! Logging daemon
//!
//! Listens on a Unix socket and hands every connection to its own worker task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use super::framed::FramedConnection;
use super::worker::handle_connection;
use crate::config::AppConfig;
use crate::storage::SessionStore;
use crate::Result;

pub struct LoggerServer {
    socket_path: PathBuf,
    store: Arc<SessionStore>,
    /// Limits how many connections are handled at once
    connection_semaphore: Arc<Semaphore>,
}

impl LoggerServer {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            socket_path: config.socket_path(),
            store: Arc::new(SessionStore::new(config.log_root())),
            connection_semaphore: Arc::new(Semaphore::new(config.server.max_connections.max(1))),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Prepare the log root and socket, then bind.
    ///
    /// Any stale file at the socket path is removed first.
    pub fn bind(&self) -> Result<UnixListener> {
        self.store.ensure_root()?;

        if self.socket_path.exists() {
            debug!("Removing stale socket {}", self.socket_path.display());
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("Logger listening on: {}", self.socket_path.display());
        info!("Logging sessions under: {}", self.store.root().display());
        Ok(listener)
    }

    /// Bind and serve until shutdown
    pub async fn run(&self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener, shutdown_rx).await
    }

    /// Accept connections on an already bound listener until shutdown
    pub async fn serve(
        &self,
        listener: UnixListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            // Holding off accept() while saturated leaves excess clients in the listen backlog
            let permit = tokio::select! {
                permit = self.connection_semaphore.clone().acquire_owned() => {
                    permit.map_err(|e| crate::Error::Other(format!("Failed to acquire semaphore: {}", e)))?
                }
                _ = shutdown_rx.wait_for(|stop| *stop) => break,
            };

            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let store = self.store.clone();
                            tokio::spawn(async move {
                                let _permit = permit;
                                match handle_connection(FramedConnection::new(stream), &store).await {
                                    Ok(entry) => info!(
                                        "[{}] Logged {:?} ({} bytes, sha1 {}) to {}",
                                        entry.context.uuid,
                                        String::from_utf8_lossy(&entry.command),
                                        entry.output_len,
                                        entry.hash,
                                        entry.path.display()
                                    ),
                                    Err(e) if e.is_protocol() => debug!("Dropped connection: {}", e),
                                    Err(e) => warn!("Error handling connection: {}", e),
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.wait_for(|stop| *stop) => break,
            }
        }

        info!("Logger shutting down");
        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixStream;

    fn test_config(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.general.log_root = dir.join("logs");
        config.server.socket_path = dir.join("run").join("logger.sock");
        config
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::create_dir_all(dir.path().join("run")).unwrap();
        std::fs::write(config.socket_path(), b"stale").unwrap();

        let server = LoggerServer::new(&config);
        let _listener = server.bind().unwrap();

        assert!(config.log_root().is_dir());
        UnixStream::connect(config.socket_path()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rebind_after_previous_listener() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let server = LoggerServer::new(&config);

        drop(server.bind().unwrap());
        // The socket file outlives the dropped listener
        assert!(config.socket_path().exists());
        let _listener = server.bind().unwrap();
    }

    #[tokio::test]
    async fn test_serve_logs_and_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let server = Arc::new(LoggerServer::new(&config));
        let listener = server.bind().unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(listener, shutdown_rx).await })
        };

        let mut stream = UnixStream::connect(config.socket_path()).await.unwrap();
        stream
            .write_all(b"::new_cmd:: abc12345 mysession\nack\ncmd : ls -la\nhello\n")
            .await
            .unwrap();
        drop(stream);

        let log = config
            .session_dir("mysession")
            .join(crate::storage::log_file_name(b"ls -la"));
        let mut written = false;
        for _ in 0..100 {
            if std::fs::read(&log).map(|b| b == b"hello\n").unwrap_or(false) {
                written = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(written);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!config.socket_path().exists());
    }
}
