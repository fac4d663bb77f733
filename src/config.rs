//! # Agent Configuration
//!
//! Configuration for the remote job queue link, webcam snapshots, local storage,
//! connectivity checks and the control API.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [autodrop]
//! name = "printer-1"
//! key = "api-key"
//! polling_interval = 10.0
//! auto_eject_active = false
//!
//! [[autodrop.at_commands]]
//! command = "EJECT"
//! action = "echo ejecting"
//!
//! [webcam]
//! snapshot = "http://127.0.0.1:8080/?action=snapshot"
//!
//! [storage]
//! uploads = "/var/lib/autodrop/uploads"
//! data_folder = "/var/lib/autodrop/data"
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Queue endpoint used when none is configured.
pub const DEFAULT_SERVER_URL: &str = "https://go.autodrop3d.com/api/jobsQueue/printerRequestJob";
/// Shortest polling interval a timer is started with.
pub const MIN_POLLING_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the agent.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default)]
    pub autodrop: RemoteQueueConfig,
    #[serde(default)]
    pub webcam: WebcamConfig,
    #[serde(default)]
    pub online_check: OnlineCheckConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub web: WebConfig,
}

/// Remote queue identity and polling behaviour.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RemoteQueueConfig {
    /// Printer identity registered with the queue.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_true")]
    pub polling_enabled: bool,
    /// Seconds between ticks of either poller.
    #[serde(default = "default_polling_interval")]
    pub polling_interval: f64,
    #[serde(default)]
    pub at_commands: Vec<AtCommand>,
    #[serde(default)]
    pub notify_complete: bool,
    /// Run after every finished print. Empty disables it.
    #[serde(default)]
    pub custom_script: String,
    #[serde(default)]
    pub use_gpio: bool,
    #[serde(default)]
    pub auto_eject_active: bool,
}

impl Default for RemoteQueueConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            key: String::new(),
            server: default_server(),
            polling_enabled: true,
            polling_interval: default_polling_interval(),
            at_commands: Vec::new(),
            notify_complete: false,
            custom_script: String::new(),
            use_gpio: false,
            auto_eject_active: false,
        }
    }
}

impl RemoteQueueConfig {
    /// The polling interval as a period, or `None` when no timer can run on it.
    pub fn try_polling_period(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.polling_interval)
            .ok()
            .filter(|period| *period >= MIN_POLLING_PERIOD)
    }

    /// Validated configurations always have a usable period; anything else polls
    /// at the default interval.
    pub fn polling_period(&self) -> Duration {
        self.try_polling_period()
            .unwrap_or_else(|| Duration::from_secs_f64(default_polling_interval()))
    }

    pub fn find_at_command(&self, name: &str) -> Option<&AtCommand> {
        self.at_commands.iter().find(|c| c.command == name)
    }
}

/// An in-band command to watch for and the action to run when it comes back.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AtCommand {
    pub command: String,
    #[serde(default, alias = "python")]
    pub action: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WebcamConfig {
    /// Snapshot URL. Empty means no camera.
    #[serde(default)]
    pub snapshot: String,
    #[serde(default = "default_snapshot_timeout")]
    pub snapshot_timeout: u64,
    #[serde(default = "default_true")]
    pub snapshot_ssl_validation: bool,
}

impl Default for WebcamConfig {
    fn default() -> Self {
        Self {
            snapshot: String::new(),
            snapshot_timeout: default_snapshot_timeout(),
            snapshot_ssl_validation: true,
        }
    }
}

/// Host probed for connectivity and used to pick the outbound interface.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OnlineCheckConfig {
    #[serde(default = "default_online_host")]
    pub host: String,
    #[serde(default = "default_online_port")]
    pub port: u16,
    #[serde(default = "default_online_interval")]
    pub interval: u64,
}

impl Default for OnlineCheckConfig {
    fn default() -> Self {
        Self {
            host: default_online_host(),
            port: default_online_port(),
            interval: default_online_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageConfig {
    /// Root of the `local` staging namespace.
    #[serde(default = "default_uploads")]
    pub uploads: PathBuf,
    #[serde(default = "default_data_folder")]
    pub data_folder: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { uploads: default_uploads(), data_folder: default_data_folder() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HttpConfig {
    /// Timeout in seconds for every call to the remote queue.
    #[serde(default = "default_http_timeout")]
    pub timeout: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout: default_http_timeout() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Token lifetime in seconds.
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: i64,
    #[serde(default)]
    pub users: Vec<WebUser>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { bind: default_bind(), jwt_expiration: default_jwt_expiration(), users: Vec::new() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WebUser {
    pub username: String,
    pub password: String,
    /// Grants the control capability.
    #[serde(default)]
    pub admin: bool,
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.autodrop.try_polling_period().is_none() {
            return Err(ConfigError::Invalid(format!(
                "polling_interval must be a number of seconds of at least {:?}, got {}",
                MIN_POLLING_PERIOD, self.autodrop.polling_interval
            )));
        }
        if self.autodrop.server.trim().is_empty() {
            return Err(ConfigError::Invalid("server URL cannot be empty".to_string()));
        }
        if let Some(blank) = self.autodrop.at_commands.iter().find(|c| c.command.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("monitored command with empty name: {:?}", blank)));
        }
        Ok(())
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_server() -> String { DEFAULT_SERVER_URL.to_string() }
fn default_polling_interval() -> f64 { 10.0 }
fn default_snapshot_timeout() -> u64 { 5 }
fn default_online_host() -> String { "8.8.8.8".to_string() }
fn default_online_port() -> u16 { 53 }
fn default_online_interval() -> u64 { 15 }
fn default_uploads() -> PathBuf { PathBuf::from("uploads") }
fn default_data_folder() -> PathBuf { PathBuf::from("data") }
fn default_http_timeout() -> u64 { 30 }
fn default_bind() -> String { "0.0.0.0:3000".to_string() }
fn default_jwt_expiration() -> i64 { 3600 }

/// Load and validate configuration from a TOML file at the given path.
pub fn load_config(path: impl AsRef<Path>) -> Result<AgentConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path.display(), e);
        ConfigError::Io(e)
    })?;
    let config: AgentConfig = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}

/// Write configuration back to a TOML file.
pub fn save_config(path: impl AsRef<Path>, config: &AgentConfig) -> Result<(), ConfigError> {
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}
