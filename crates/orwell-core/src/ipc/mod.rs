//! IPC between pane clients and the logging daemon
//!
//! A line-oriented protocol over a Unix socket, one command per connection.

mod client;
mod framed;
pub mod protocol;
mod server;
mod worker;

pub use client::{connect, LoggerConnection};
pub use framed::FramedConnection;
pub use protocol::ConnectionContext;
pub use server::LoggerServer;
pub use worker::{handle_connection, LogEntry};
