// src/error.rs - Agent-wide error type
use autodrop_shared::{DeviceError, StagingError};
use thiserror::Error;

use crate::actions::ActionError;
use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Action error: {0}")]
    Action(#[from] ActionError),
    #[error("Coordinator is not running")]
    CoordinatorGone,
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Failure of a control API command.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("A filename is required")]
    MissingFilename,
    #[error(transparent)]
    Agent(#[from] AgentError),
}
