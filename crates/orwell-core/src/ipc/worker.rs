//! Server side of one client connection
//!
//! handshake -> filler -> descriptor -> output until EOF -> persist

use std::path::PathBuf;

use tokio::io::AsyncRead;
use tracing::{debug, info, info_span, Instrument};

use super::framed::FramedConnection;
use super::protocol::{parse_descriptor, parse_handshake, ConnectionContext};
use crate::storage::{content_hash, SessionStore};
use crate::Result;

/// What a finished connection left on disk
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub context: ConnectionContext,
    pub command: Vec<u8>,
    pub hash: String,
    pub path: PathBuf,
    pub output_len: usize,
}

/// Run the server protocol over one connection and persist its output.
///
/// Nothing is written unless the handshake parses.
pub async fn handle_connection<S>(mut conn: FramedConnection<S>, store: &SessionStore) -> Result<LogEntry>
where
    S: AsyncRead + Unpin,
{
    let line = conn.recv_line().await?;
    let context = parse_handshake(&line)?;

    let span = info_span!("conn", uuid = %context.uuid, session = %context.session);
    record_command(conn, context, store).instrument(span).await
}

async fn record_command<S>(
    mut conn: FramedConnection<S>,
    context: ConnectionContext,
    store: &SessionStore,
) -> Result<LogEntry>
where
    S: AsyncRead + Unpin,
{
    info!("New connection");

    // Filler line, reserved for an acknowledgment
    let _ = conn.recv_line().await?;

    let descriptor = conn.recv_line().await?;
    debug!("Descriptor: {}", String::from_utf8_lossy(descriptor.trim_ascii_end()));
    let command = parse_descriptor(&descriptor)?;
    let hash = content_hash(&command);

    store.ensure_session(&context.session).await?;

    let mut output = Vec::new();
    loop {
        let line = conn.recv_line().await?;
        if line.is_empty() {
            break;
        }
        output.extend_from_slice(&line);
    }
    drop(conn);

    let path = store.persist(&context.session, &command, &output).await?;

    Ok(LogEntry {
        context,
        command,
        hash,
        path,
        output_len: output.len(),
    })
}
