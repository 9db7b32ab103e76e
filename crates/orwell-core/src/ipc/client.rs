//! Client side of the logging connection

use std::io::ErrorKind;
use std::path::Path;

use tokio::net::UnixStream;
use tracing::{debug, info};

use super::framed::FramedConnection;
use super::protocol::{handshake_frame, new_correlation_id, ConnectionContext};
use crate::{Error, Result};

/// A handshaken connection to the daemon, carrying one command
pub struct LoggerConnection {
    context: ConnectionContext,
    framed: FramedConnection<UnixStream>,
}

impl LoggerConnection {
    pub fn uuid(&self) -> &str {
        &self.context.uuid
    }

    /// Forward raw bytes to the daemon
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.framed.send(data).await.map_err(Error::PeerGone)
    }

    /// Signal end of output to the daemon
    pub async fn close(mut self) {
        if let Err(e) = self.framed.shutdown().await {
            debug!("Shutdown of connection {} failed: {}", self.context.uuid, e);
        }
    }
}

/// Open a connection to the daemon and send the handshake for `session`
pub async fn connect(socket_path: &Path, session: &str) -> Result<LoggerConnection> {
    let context = ConnectionContext {
        uuid: new_correlation_id(),
        session: session.to_string(),
    };
    info!("Connecting to {}", socket_path.display());

    let stream = UnixStream::connect(socket_path).await.map_err(|e| match e.kind() {
        // A socket file with no listener behind it is as good as no socket
        ErrorKind::NotFound | ErrorKind::ConnectionRefused => Error::EndpointUnavailable {
            path: socket_path.to_path_buf(),
            source: e,
        },
        _ => Error::Io(e),
    })?;

    let mut framed = FramedConnection::new(stream);
    framed
        .send(handshake_frame(&context.uuid, &context.session).as_bytes())
        .await
        .map_err(Error::PeerGone)?;
    info!("Connected as {}", context.uuid);

    Ok(LoggerConnection { context, framed })
}
