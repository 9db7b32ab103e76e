use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Logger endpoint unavailable at {}: {source}", path.display())]
    EndpointUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Peer went away: {0}")]
    PeerGone(#[source] std::io::Error),

    #[error("Malformed handshake: {0}")]
    MalformedHandshake(String),

    #[error("Malformed command descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("Failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Protocol errors are dropped quietly by the daemon; everything else is worth a warning.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::MalformedHandshake(_) | Error::MalformedDescriptor(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
