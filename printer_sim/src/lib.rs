//! Simulated printer for running the agent without hardware.
//!
//! The simulator implements [`DeviceControl`], streams the selected G-code file one
//! line per clock step through the installed [`ProtocolHooks`], honours `@pause`,
//! echoes `M118` status lines back as received lines, and raises the lifecycle
//! [`PrinterEvent`]s a host would.

use autodrop_shared::{DeviceControl, DeviceError, PrinterEvent, Progress, ProtocolHooks};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Device commands the simulator received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCommand {
    SelectAndPrint(String),
    Cancel,
    Resume,
}

#[derive(Debug, Default)]
struct SimState {
    connected: bool,
    printing: bool,
    paused: bool,
    selected: Option<String>,
    pending: VecDeque<String>,
    total_lines: usize,
    sent_lines: usize,
    completion_override: Option<f64>,
    commands: Vec<SimCommand>,
}

pub struct SimulatedPrinter {
    state: Mutex<SimState>,
    files_root: Option<PathBuf>,
    events: Option<UnboundedSender<PrinterEvent>>,
    hooks: RwLock<Option<Arc<dyn ProtocolHooks>>>,
}

impl Default for SimulatedPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPrinter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            files_root: None,
            events: None,
            hooks: RwLock::new(None),
        }
    }

    /// Resolve selected files against this directory and stream their lines.
    pub fn with_files_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.files_root = Some(root.into());
        self
    }

    /// Emit lifecycle events on this channel.
    pub fn with_events(mut self, events: UnboundedSender<PrinterEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn set_hooks(&self, hooks: Arc<dyn ProtocolHooks>) {
        if let Ok(mut slot) = self.hooks.write() {
            *slot = Some(hooks);
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A poisoned lock only means a panicking test thread; the state is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: PrinterEvent) {
        tracing::debug!("Simulator event: {:?}", event);
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    pub fn connect(&self) {
        self.lock().connected = true;
        tracing::info!("Simulated printer connected");
        self.emit(PrinterEvent::Connected);
    }

    pub fn disconnect(&self) {
        let interrupted = {
            let mut state = self.lock();
            state.connected = false;
            state.paused = false;
            let was_printing = std::mem::take(&mut state.printing);
            state.pending.clear();
            was_printing.then(|| state.selected.clone()).flatten()
        };
        if let Some(path) = interrupted {
            self.emit(PrinterEvent::PrintFailed { path });
        }
        tracing::info!("Simulated printer disconnected");
        self.emit(PrinterEvent::Disconnected);
    }

    /// Pause the active print, as an `@pause` reaching the host would.
    pub fn pause(&self) {
        let mut state = self.lock();
        if state.printing {
            state.paused = true;
        }
    }

    /// Force the reported completion, independent of streamed lines.
    pub fn set_completion(&self, percent: f64) {
        self.lock().completion_override = Some(percent);
    }

    pub fn commands(&self) -> Vec<SimCommand> {
        self.lock().commands.clone()
    }

    /// Finish the active print immediately.
    pub fn finish(&self) {
        let done = {
            let mut state = self.lock();
            if !state.printing {
                return;
            }
            state.printing = false;
            state.paused = false;
            state.pending.clear();
            state.sent_lines = state.total_lines;
            state.completion_override = Some(100.0);
            state.selected.clone()
        };
        if let Some(path) = done {
            self.emit(PrinterEvent::PrintDone { path });
        }
    }

    /// Send the next line of the active file. Returns false when nothing was sent.
    pub fn step(&self) -> bool {
        let line = {
            let mut state = self.lock();
            if !state.printing || state.paused {
                return false;
            }
            match state.pending.pop_front() {
                Some(line) => line,
                None => {
                    drop(state);
                    self.finish();
                    return false;
                }
            }
        };

        let hooks = self.hooks.read().ok().and_then(|slot| slot.clone());
        let outgoing = match &hooks {
            Some(hooks) => hooks.outbound(&line),
            None => vec![line],
        };
        // The whole batch reaches the printer before anything is echoed back, so a
        // pause in the batch is in effect when the echo arrives.
        let mut echoes = Vec::new();
        for sent in &outgoing {
            tracing::trace!("Simulator <- {}", sent);
            if sent.trim() == "@pause" {
                self.lock().paused = true;
                tracing::info!("Simulated printer paused by protocol");
            } else if let Some(echo) = sent.strip_prefix("M118 ") {
                echoes.push(echo);
            }
        }
        self.lock().sent_lines += 1;
        if let Some(hooks) = &hooks {
            for echo in echoes {
                hooks.inbound(echo);
            }
        }
        true
    }

    /// Drive [`step`](Self::step) on a fixed period until the task is aborted.
    pub fn spawn_clock(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                self.step();
            }
        })
    }

    fn load_lines(&self, path: &str) -> Result<VecDeque<String>, DeviceError> {
        let Some(root) = &self.files_root else {
            return Ok(VecDeque::new());
        };
        let content = std::fs::read_to_string(root.join(path))
            .map_err(|_| DeviceError::FileNotFound(path.to_string()))?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with(';'))
            .map(str::to_string)
            .collect())
    }
}

impl DeviceControl for SimulatedPrinter {
    fn is_ready(&self) -> bool {
        let state = self.lock();
        state.connected && !state.printing && !state.paused
    }

    fn is_printing(&self) -> bool {
        let state = self.lock();
        state.printing && !state.paused
    }

    fn is_paused(&self) -> bool {
        self.lock().paused
    }

    fn select_and_print(&self, path: &str) -> Result<(), DeviceError> {
        {
            let state = self.lock();
            if !state.connected {
                return Err(DeviceError::NotConnected);
            }
            if state.printing {
                return Err(DeviceError::Busy(format!("already printing {:?}", state.selected)));
            }
        }
        let lines = self.load_lines(path)?;
        {
            let mut state = self.lock();
            state.commands.push(SimCommand::SelectAndPrint(path.to_string()));
            state.total_lines = lines.len();
            state.sent_lines = 0;
            state.pending = lines;
            state.selected = Some(path.to_string());
            state.completion_override = None;
            state.printing = true;
            state.paused = false;
        }
        tracing::info!("Simulated printer printing {}", path);
        self.emit(PrinterEvent::PrintStarted { path: path.to_string() });
        Ok(())
    }

    fn cancel_print(&self) -> Result<(), DeviceError> {
        let cancelled = {
            let mut state = self.lock();
            state.commands.push(SimCommand::Cancel);
            if !state.printing {
                return Ok(());
            }
            state.printing = false;
            state.paused = false;
            state.pending.clear();
            state.selected.clone()
        };
        if let Some(path) = cancelled {
            self.emit(PrinterEvent::PrintCancelled { path });
        }
        Ok(())
    }

    fn resume_print(&self) -> Result<(), DeviceError> {
        let mut state = self.lock();
        state.commands.push(SimCommand::Resume);
        state.paused = false;
        Ok(())
    }

    fn current_progress(&self) -> Progress {
        let state = self.lock();
        let completion = state.completion_override.or_else(|| {
            state.selected.as_ref().map(|_| {
                if state.total_lines == 0 {
                    0.0
                } else {
                    state.sent_lines as f64 / state.total_lines as f64 * 100.0
                }
            })
        });
        Progress { completion, file_path: state.selected.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct EchoHooks {
        received: Mutex<Vec<String>>,
    }

    impl ProtocolHooks for EchoHooks {
        fn outbound(&self, line: &str) -> Vec<String> {
            if line.starts_with("@EJECT") {
                vec!["M400".into(), "M118 AUTODROP3D EJECT".into(), "@pause".into()]
            } else {
                vec![line.to_string()]
            }
        }

        fn inbound(&self, line: &str) -> String {
            self.received.lock().unwrap().push(line.to_string());
            line.to_string()
        }
    }

    /// Records whether the printer was already paused when each echo arrived.
    struct PauseRecorder {
        printer: Mutex<Option<Arc<SimulatedPrinter>>>,
        paused_on_echo: Mutex<Vec<bool>>,
    }

    impl ProtocolHooks for PauseRecorder {
        fn outbound(&self, line: &str) -> Vec<String> {
            if line.starts_with("@EJECT") {
                vec!["M400".into(), "M118 AUTODROP3D EJECT".into(), "@pause".into()]
            } else {
                vec![line.to_string()]
            }
        }

        fn inbound(&self, line: &str) -> String {
            if let Some(printer) = self.printer.lock().unwrap().as_ref() {
                self.paused_on_echo.lock().unwrap().push(printer.is_paused());
            }
            line.to_string()
        }
    }

    #[test]
    fn test_pause_applies_before_echo() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Autodrop3D")).unwrap();
        std::fs::write(dir.path().join("Autodrop3D/a.gcode"), "@EJECT\nG1 X2\n").unwrap();
        let printer = Arc::new(SimulatedPrinter::new().with_files_root(dir.path()));
        let hooks = Arc::new(PauseRecorder { printer: Mutex::new(None), paused_on_echo: Mutex::new(Vec::new()) });
        printer.set_hooks(hooks.clone());
        *hooks.printer.lock().unwrap() = Some(printer.clone());
        printer.connect();
        printer.select_and_print("Autodrop3D/a.gcode").unwrap();

        assert!(printer.step());
        assert_eq!(hooks.paused_on_echo.lock().unwrap().as_slice(), [true]);
        // Break the printer <-> hooks cycle.
        hooks.printer.lock().unwrap().take();
    }

    #[test]
    fn test_select_requires_connection() {
        let printer = SimulatedPrinter::new();
        assert_eq!(printer.select_and_print("a.gcode"), Err(DeviceError::NotConnected));
        printer.connect();
        assert!(printer.is_ready());
        printer.select_and_print("a.gcode").unwrap();
        assert!(printer.is_printing());
        assert!(!printer.is_ready());
        assert!(matches!(printer.select_and_print("b.gcode"), Err(DeviceError::Busy(_))));
    }

    #[test]
    fn test_events_follow_lifecycle() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = SimulatedPrinter::new().with_events(tx);
        printer.connect();
        printer.select_and_print("Autodrop3D/a.gcode").unwrap();
        printer.cancel_print().unwrap();
        printer.select_and_print("Autodrop3D/b.gcode").unwrap();
        printer.finish();
        let path = |p: &str| p.to_string();
        assert_eq!(rx.try_recv().unwrap(), PrinterEvent::Connected);
        assert_eq!(rx.try_recv().unwrap(), PrinterEvent::PrintStarted { path: path("Autodrop3D/a.gcode") });
        assert_eq!(rx.try_recv().unwrap(), PrinterEvent::PrintCancelled { path: path("Autodrop3D/a.gcode") });
        assert_eq!(rx.try_recv().unwrap(), PrinterEvent::PrintStarted { path: path("Autodrop3D/b.gcode") });
        assert_eq!(rx.try_recv().unwrap(), PrinterEvent::PrintDone { path: path("Autodrop3D/b.gcode") });
    }

    #[test]
    fn test_streaming_pauses_on_intercepted_command() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Autodrop3D")).unwrap();
        std::fs::write(dir.path().join("Autodrop3D/a.gcode"), ";START\n\n;a\nG1 X1\n@EJECT\nG1 X2\n").unwrap();
        let hooks = Arc::new(EchoHooks { received: Mutex::new(Vec::new()) });
        let printer = SimulatedPrinter::new().with_files_root(dir.path());
        printer.set_hooks(hooks.clone());
        printer.connect();
        printer.select_and_print("Autodrop3D/a.gcode").unwrap();

        assert!(printer.step());
        assert!(printer.step());
        assert!(printer.is_paused());
        assert!(!printer.step());
        assert_eq!(hooks.received.lock().unwrap().as_slice(), ["AUTODROP3D EJECT"]);

        printer.resume_print().unwrap();
        assert!(printer.step());
        assert_eq!(printer.current_progress().completion, Some(100.0));
        assert!(!printer.step());
        assert!(!printer.is_printing());
    }
}
