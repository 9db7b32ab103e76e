pub mod agent;
pub mod config;
pub mod error;
pub mod ipc;
pub mod storage;

pub use agent::{ClientAgent, ClientArgs};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use ipc::{FramedConnection, LoggerServer};
pub use storage::SessionStore;
