//! Operator-supplied actions.
//!
//! The custom post-completion script and the per-command actions of monitored
//! in-band commands are configured as free text. They never run inside the agent:
//! an [`UntrustedAction`] runner receives the text plus a narrow invocation
//! (command name and parameter list) and decides how to execute it.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Failed to start action '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Action '{0}' timed out after {1:?}")]
    Timeout(String, Duration),
    #[error("Action '{name}' exited with {code:?}: {stderr}")]
    Failed { name: String, code: Option<i32>, stderr: String },
}

/// What an action is invoked with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionInvocation {
    pub name: String,
    pub params: Vec<String>,
}

impl ActionInvocation {
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        Self { name: name.into(), params }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub code: Option<i32>,
    pub stdout: String,
}

#[async_trait]
pub trait UntrustedAction: Send + Sync {
    async fn run(&self, source: &str, invocation: &ActionInvocation) -> Result<ActionOutcome, ActionError>;
}

/// Runs action text with `sh -c` in a child process.
///
/// The command name is `$0` and `AUTODROP_COMMAND`; parameters are the positional
/// arguments and `AUTODROP_PARAMS` (space separated). The child is killed when the
/// timeout elapses.
#[derive(Debug, Clone)]
pub struct ShellAction {
    shell: String,
    timeout: Duration,
}

impl ShellAction {
    pub fn new(timeout: Duration) -> Self {
        Self { shell: "sh".to_string(), timeout }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

impl Default for ShellAction {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl UntrustedAction for ShellAction {
    async fn run(&self, source: &str, invocation: &ActionInvocation) -> Result<ActionOutcome, ActionError> {
        tracing::debug!("Running action '{}' with {:?}", invocation.name, invocation.params);
        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(source)
            .arg(&invocation.name)
            .args(&invocation.params)
            .env("AUTODROP_COMMAND", &invocation.name)
            .env("AUTODROP_PARAMS", invocation.params.join(" "))
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|source| ActionError::Spawn { name: invocation.name.clone(), source })?,
            Err(_) => return Err(ActionError::Timeout(invocation.name.clone(), self.timeout)),
        };
        let code = output.status.code();
        if !output.status.success() {
            return Err(ActionError::Failed {
                name: invocation.name.clone(),
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(ActionOutcome { code, stdout: String::from_utf8_lossy(&output.stdout).into_owned() })
    }
}

/// Run an action and log the result. Returns true when it succeeded.
pub async fn run_logged(runner: &dyn UntrustedAction, source: &str, invocation: &ActionInvocation) -> bool {
    match runner.run(source, invocation).await {
        Ok(outcome) => {
            tracing::info!("Action '{}' finished ({:?})", invocation.name, outcome.code);
            true
        }
        Err(e) => {
            tracing::error!("{}", e);
            false
        }
    }
}

/// Run an action on its own task.
pub fn spawn_action(
    runner: Arc<dyn UntrustedAction>,
    source: String,
    invocation: ActionInvocation,
) -> tokio::task::JoinHandle<bool> {
    tokio::spawn(async move { run_logged(runner.as_ref(), &source, &invocation).await })
}
