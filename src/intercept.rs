//! In-band command hooks on the device protocol stream.
//!
//! A monitored command such as `@EJECT fast` on its way to the printer becomes
//!
//! ```text
//! M400
//! M118 AUTODROP3D EJECT fast
//! @pause
//! ```
//!
//! so the printer drains its moves, echoes the status line back and pauses. When
//! the echoed `AUTODROP3D` line comes in, the configured action runs and the print
//! resumes.

use autodrop_shared::{DeviceControl, ProtocolHooks};
use std::sync::Arc;
use tokio::sync::watch;

use crate::actions::{self, ActionInvocation, UntrustedAction};
use crate::config::AgentConfig;

/// Marker opening every in-band status line.
pub const MARKER: &str = "AUTODROP3D";
const MONITOR_PREFIX: char = '@';

pub struct CommandInterceptor {
    config: watch::Receiver<Arc<AgentConfig>>,
    device: Arc<dyn DeviceControl>,
    runner: Arc<dyn UntrustedAction>,
}

impl CommandInterceptor {
    pub fn new(
        config: watch::Receiver<Arc<AgentConfig>>,
        device: Arc<dyn DeviceControl>,
        runner: Arc<dyn UntrustedAction>,
    ) -> Self {
        Self { config, device, runner }
    }

    fn monitored_action(&self, name: &str) -> Option<String> {
        let config = self.config.borrow();
        config.autodrop.find_at_command(name).map(|c| c.action.clone())
    }
}

/// Split an echoed status line into command name and parameters.
pub fn parse_status_line(line: &str) -> Option<(String, Vec<String>)> {
    let line = line.trim();
    let line = line.strip_prefix("echo:").unwrap_or(line).trim_start();
    let rest = line.strip_prefix(MARKER)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let mut tokens = rest.split_whitespace();
    let name = tokens.next()?.to_string();
    Some((name, tokens.map(str::to_string).collect()))
}

impl ProtocolHooks for CommandInterceptor {
    fn outbound(&self, line: &str) -> Vec<String> {
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            return vec![line.to_string()];
        };
        let name = first.trim_start_matches(MONITOR_PREFIX);
        if self.monitored_action(name).is_none() {
            return vec![line.to_string()];
        }
        let status = std::iter::once(name).chain(tokens).collect::<Vec<_>>().join(" ");
        tracing::info!("Intercepted monitored command {}", name);
        vec!["M400".to_string(), format!("M118 {} {}", MARKER, status), "@pause".to_string()]
    }

    fn inbound(&self, line: &str) -> String {
        let Some((name, params)) = parse_status_line(line) else {
            return line.to_string();
        };
        let Some(source) = self.monitored_action(&name) else {
            tracing::debug!("Ignoring unmonitored in-band command {}", name);
            return line.to_string();
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No runtime to run action for {}", name);
            return line.to_string();
        };
        let runner = self.runner.clone();
        let device = self.device.clone();
        runtime.spawn(async move {
            let invocation = ActionInvocation::new(name, params);
            actions::run_logged(runner.as_ref(), &source, &invocation).await;
            if device.is_paused() {
                if let Err(e) = device.resume_print() {
                    tracing::error!("Failed to resume after {}: {}", invocation.name, e);
                }
            }
        });
        line.to_string()
    }
}
