//! Line protocol spoken between pane clients and the logging daemon
//!
//! A connection carries, in order:
//! 1. handshake `::new_cmd:: <uuid> <session>\n`
//! 2. one filler line, ignored
//! 3. descriptor `<anything> : <command>\n`
//! 4. raw command output until the client closes the stream

use uuid::Uuid;

use crate::{Error, Result};

/// Marker opening every handshake line
pub const NEW_CMD: &str = "::new_cmd::";

/// Any stdin line containing this ends the current command on the client side
pub const END_CMD: &str = "::end_cmd::";

/// Separates the prompt part of the descriptor line from the command text
pub const DESCRIPTOR_SEPARATOR: &[u8] = b" : ";

/// Zero-based index of the stdin line subject to the backslash convention
pub const ESCAPED_LINE_INDEX: usize = 2;

/// Per-connection values fixed by the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    pub uuid: String,
    pub session: String,
}

/// Fresh 8 hex character correlation id
pub fn new_correlation_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

pub fn handshake_frame(uuid: &str, session: &str) -> String {
    format!("{} {} {}\n", NEW_CMD, uuid, session)
}

/// Parse a handshake line into a connection context
pub fn parse_handshake(line: &[u8]) -> Result<ConnectionContext> {
    let text = std::str::from_utf8(line)
        .map_err(|_| Error::MalformedHandshake("handshake is not valid UTF-8".to_string()))?;

    if !text.starts_with(NEW_CMD) {
        return Err(Error::MalformedHandshake(format!(
            "expected {} marker, got {:?}",
            NEW_CMD,
            truncate(text)
        )));
    }

    let mut tokens = text.split_whitespace().skip(1);
    let (uuid, session) = match (tokens.next(), tokens.next()) {
        (Some(uuid), Some(session)) => (uuid, session),
        _ => {
            return Err(Error::MalformedHandshake(format!(
                "missing uuid or session in {:?}",
                truncate(text)
            )))
        }
    };

    validate_session(session)?;

    Ok(ConnectionContext {
        uuid: uuid.to_string(),
        session: session.to_string(),
    })
}

/// Session ids become directory names under the log root
fn validate_session(session: &str) -> Result<()> {
    if session.is_empty() || session == "." || session == ".." || session.contains('/') {
        return Err(Error::MalformedHandshake(format!(
            "session id {:?} is not a valid directory name",
            session
        )));
    }
    Ok(())
}

/// Extract the command text from a descriptor line.
///
/// An empty line (the stream ended early) yields an empty command.
pub fn parse_descriptor(line: &[u8]) -> Result<Vec<u8>> {
    if line.is_empty() {
        return Ok(Vec::new());
    }

    let pos = line
        .windows(DESCRIPTOR_SEPARATOR.len())
        .position(|w| w == DESCRIPTOR_SEPARATOR)
        .ok_or_else(|| {
            Error::MalformedDescriptor(format!(
                "no {:?} separator in {:?}",
                String::from_utf8_lossy(DESCRIPTOR_SEPARATOR),
                truncate(&String::from_utf8_lossy(line))
            ))
        })?;

    let command = &line[pos + DESCRIPTOR_SEPARATOR.len()..];
    Ok(command.strip_suffix(b"\n").unwrap_or(command).to_vec())
}

pub fn is_end_of_command(line: &[u8]) -> bool {
    line.windows(END_CMD.len()).any(|w| w == END_CMD.as_bytes())
}

/// Rewrite a stdin line before it is forwarded.
///
/// Only the line at [`ESCAPED_LINE_INDEX`] is touched: if it contains a
/// backslash, everything up to and including the first one is dropped.
pub fn outgoing_line(index: usize, line: &[u8]) -> &[u8] {
    if index != ESCAPED_LINE_INDEX {
        return line;
    }
    match line.iter().position(|&b| b == b'\\') {
        Some(pos) => &line[pos + 1..],
        None => line,
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(64).collect()
}
