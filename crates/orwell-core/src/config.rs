use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Root directory holding one sub-directory per session
    #[serde(default = "default_log_root")]
    pub log_root: PathBuf,
    /// Log level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_root: default_log_root(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unix socket the daemon listens on and clients connect to
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Upper bound on connections handled at the same time
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Directory for instance-marker files
    #[serde(default = "default_marker_dir")]
    pub marker_dir: PathBuf,
    /// Pause between failed connection attempts
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
    /// How often the pane process is checked
    #[serde(default = "default_watchdog_interval")]
    pub watchdog_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            marker_dir: default_marker_dir(),
            retry_interval_ms: default_retry_interval(),
            watchdog_interval_ms: default_watchdog_interval(),
        }
    }
}

impl ClientConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }
}

fn default_log_root() -> PathBuf {
    PathBuf::from("~/.logged")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/logger.sock")
}

fn default_max_connections() -> usize {
    64
}

fn default_marker_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_retry_interval() -> u64 {
    1000
}

fn default_watchdog_interval() -> u64 {
    5000
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from file or return defaults
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, falling back to defaults if it is missing
    pub fn load_from(config_path: &Path) -> crate::Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> crate::Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit path, creating parent directories
    pub fn save_to(&self, config_path: &Path) -> crate::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    /// Get the configuration file path
    /// Always uses ~/.config/orwell/config.toml on all platforms
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("orwell")
            .join("config.toml")
    }

    /// Get the log root (with tilde expansion)
    pub fn log_root(&self) -> PathBuf {
        expand_tilde(&self.general.log_root)
    }

    pub fn session_dir(&self, session: &str) -> PathBuf {
        self.log_root().join(session)
    }

    pub fn socket_path(&self) -> PathBuf {
        expand_tilde(&self.server.socket_path)
    }

    /// Instance-marker path for one client: `<marker_dir>/<session>-<token1>-<token2>`
    pub fn marker_path(&self, session: &str, token1: &str, token2: &str) -> PathBuf {
        expand_tilde(&self.client.marker_dir).join(format!("{}-{}-{}", session, token1, token2))
    }
}
