// src/settings.rs - Where configuration snapshots come from and where changes go
use std::path::PathBuf;
use std::sync::Mutex;

use crate::config::{self, AgentConfig, ConfigError};

/// Persistent settings backing the agent's configuration snapshot.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<AgentConfig, ConfigError>;

    /// Persist the user's polling choice.
    fn set_polling_enabled(&self, enabled: bool) -> Result<(), ConfigError>;
}

/// Settings kept in a TOML file; every load re-reads the file.
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsStore for FileSettings {
    fn load(&self) -> Result<AgentConfig, ConfigError> {
        config::load_config(&self.path)
    }

    fn set_polling_enabled(&self, enabled: bool) -> Result<(), ConfigError> {
        let mut current = self.load()?;
        current.autodrop.polling_enabled = enabled;
        config::save_config(&self.path, &current)?;
        tracing::info!("Saved polling_enabled={} to {}", enabled, self.path.display());
        Ok(())
    }
}

/// Settings held in memory, for embedding and tests.
pub struct MemorySettings {
    config: Mutex<AgentConfig>,
}

impl MemorySettings {
    pub fn new(config: AgentConfig) -> Self {
        Self { config: Mutex::new(config) }
    }

    /// Replace the stored configuration, as an operator editing settings would.
    pub fn replace(&self, config: AgentConfig) {
        if let Ok(mut current) = self.config.lock() {
            *current = config;
        }
    }
}

impl SettingsStore for MemorySettings {
    fn load(&self) -> Result<AgentConfig, ConfigError> {
        let current = self
            .config
            .lock()
            .map_err(|e| ConfigError::Invalid(format!("settings lock poisoned: {}", e)))?;
        current.validate()?;
        Ok(current.clone())
    }

    fn set_polling_enabled(&self, enabled: bool) -> Result<(), ConfigError> {
        let mut current = self
            .config
            .lock()
            .map_err(|e| ConfigError::Invalid(format!("settings lock poisoned: {}", e)))?;
        current.autodrop.polling_enabled = enabled;
        Ok(())
    }
}
