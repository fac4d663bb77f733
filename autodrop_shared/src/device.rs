// Device control seam between the agent and whatever drives the physical printer.
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Printer is not connected")]
    NotConnected,
    #[error("Printer is busy: {0}")]
    Busy(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Device error: {0}")]
    Other(String),
}

/// Progress of the active print as reported by the device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    /// Completion in percent, `None` when nothing is loaded.
    pub completion: Option<f64>,
    /// Path of the selected file, relative to its storage namespace.
    pub file_path: Option<String>,
}

/// Operations the agent needs from the printer.
///
/// Calls are expected to return quickly; they are issued from the coordinator task.
pub trait DeviceControl: Send + Sync {
    fn is_ready(&self) -> bool;
    fn is_printing(&self) -> bool;
    fn is_paused(&self) -> bool;
    fn select_and_print(&self, path: &str) -> Result<(), DeviceError>;
    fn cancel_print(&self) -> Result<(), DeviceError>;
    fn resume_print(&self) -> Result<(), DeviceError>;
    fn current_progress(&self) -> Progress;
}
