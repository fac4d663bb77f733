//! Printer lifecycle events delivered to the agent.
use serde::{Deserialize, Serialize};

/// Events the host raises for the printer and its network link.
#[derive(Debug, Clone, PartialEq)]
pub enum PrinterEvent {
    Startup,
    Connected,
    Disconnected,
    ConnectivityChanged { online: bool },
    PrintStarted { path: String },
    PrintDone { path: String },
    PrintCancelled { path: String },
    PrintFailed { path: String },
    SettingsUpdated,
}

/// Payload-free discriminant of [`PrinterEvent`], remembered as the last relevant event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Startup,
    Connected,
    Disconnected,
    ConnectivityChanged,
    PrintStarted,
    PrintDone,
    PrintCancelled,
    PrintFailed,
    SettingsUpdated,
}

impl EventKind {
    /// Terminal states that mean the job did not complete.
    pub fn is_failure(self) -> bool {
        matches!(self, EventKind::PrintCancelled | EventKind::PrintFailed)
    }
}

impl PrinterEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PrinterEvent::Startup => EventKind::Startup,
            PrinterEvent::Connected => EventKind::Connected,
            PrinterEvent::Disconnected => EventKind::Disconnected,
            PrinterEvent::ConnectivityChanged { .. } => EventKind::ConnectivityChanged,
            PrinterEvent::PrintStarted { .. } => EventKind::PrintStarted,
            PrinterEvent::PrintDone { .. } => EventKind::PrintDone,
            PrinterEvent::PrintCancelled { .. } => EventKind::PrintCancelled,
            PrinterEvent::PrintFailed { .. } => EventKind::PrintFailed,
            PrinterEvent::SettingsUpdated => EventKind::SettingsUpdated,
        }
    }
}
