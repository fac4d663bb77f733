//! The coordinator task: sole owner of the agent state.
//!
//! Printer events, control requests and poller intents all arrive as
//! [`AgentCommand`]s on one channel and are applied in order. Nothing else mutates
//! the enabled switch, the bed-clear flag, the current job or the poller handles.

use autodrop_shared::{
    EventKind, Job, Notification, NotificationStatus, PrinterEvent, job::is_managed_path,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

use crate::actions::{self, ActionInvocation};
use crate::agent::AgentContext;
use crate::pollers::{JobQueuePoller, PrintStatusReporter};
use crate::repeated_task::{RepeatedTask, TaskHandle};

/// Name of the marker file written after a finished print when enabled.
pub const NOTIFY_COMPLETE_FILE: &str = "notifyComplete.txt";

#[derive(Debug)]
pub enum AgentCommand {
    Event(PrinterEvent),
    /// User switch from the control API. Answers with the resulting enabled flag.
    SetEnabled { enabled: bool, respond_to: oneshot::Sender<bool> },
    Snapshot { respond_to: oneshot::Sender<AgentSnapshot> },
    /// A downloaded job was written to staging.
    JobStaged { job: Job },
    /// The bed was confirmed clear, automatically or by the user.
    ConfirmBedClear { respond_to: oneshot::Sender<BedClearOutcome> },
    /// The remote queue answered a status report with the cancel sentinel.
    RemoteCancel { file_path: Option<String> },
    Shutdown,
}

/// Read-only copy of the agent state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSnapshot {
    pub enabled: bool,
    pub bed_clear: bool,
    pub current_job: Option<Job>,
    pub last_event: Option<EventKind>,
    pub job_queue_running: bool,
    pub print_status_running: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BedClearOutcome {
    /// The job that occupied the bed, now released.
    pub job: Option<Job>,
    /// Last event before the confirmation; a failure kind means nothing finished.
    pub previous_event: Option<EventKind>,
    pub enabled: bool,
}

#[derive(Debug)]
struct AgentState {
    enabled: bool,
    bed_clear: bool,
    current_job: Option<Job>,
    last_event: Option<EventKind>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self { enabled: false, bed_clear: true, current_job: None, last_event: None }
    }
}

pub(crate) struct Coordinator {
    ctx: Arc<AgentContext>,
    state: AgentState,
    enabled_tx: watch::Sender<bool>,
    job_queue_poller: JobQueuePoller,
    print_status_reporter: PrintStatusReporter,
    job_queue: Option<TaskHandle>,
    print_status: Option<TaskHandle>,
}

impl Coordinator {
    pub(crate) fn new(
        ctx: Arc<AgentContext>,
        job_queue_poller: JobQueuePoller,
        print_status_reporter: PrintStatusReporter,
    ) -> Self {
        let (enabled_tx, _) = watch::channel(false);
        Self {
            ctx,
            state: AgentState::default(),
            enabled_tx,
            job_queue_poller,
            print_status_reporter,
            job_queue: None,
            print_status: None,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<AgentCommand>) {
        tracing::info!("Coordinator started");
        while let Some(command) = commands.recv().await {
            match command {
                AgentCommand::Event(event) => self.on_event(event),
                AgentCommand::SetEnabled { enabled, respond_to } => {
                    self.set_user_enabled(enabled);
                    let _ = respond_to.send(self.state.enabled);
                }
                AgentCommand::Snapshot { respond_to } => {
                    let _ = respond_to.send(self.snapshot());
                }
                AgentCommand::JobStaged { job } => self.on_job_staged(job),
                AgentCommand::ConfirmBedClear { respond_to } => {
                    let _ = respond_to.send(self.confirm_bed_clear());
                }
                AgentCommand::RemoteCancel { file_path } => self.on_remote_cancel(file_path),
                AgentCommand::Shutdown => break,
            }
        }
        self.stop_job_queue();
        self.stop_print_status();
        tracing::info!("Coordinator stopped");
    }

    fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            enabled: self.state.enabled,
            bed_clear: self.state.bed_clear,
            current_job: self.state.current_job.clone(),
            last_event: self.state.last_event,
            job_queue_running: running(&self.job_queue),
            print_status_running: running(&self.print_status),
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        if self.state.enabled != enabled {
            tracing::info!("Autodrop enabled: {}", enabled);
        }
        self.state.enabled = enabled;
        self.enabled_tx.send_replace(enabled);
        // Pollers only end on their own when the switch is off; dropping the handles
        // here keeps a later start from mistaking an exiting task for a live one.
        if !enabled {
            self.stop_job_queue();
            self.stop_print_status();
        }
    }

    fn set_user_enabled(&mut self, enabled: bool) {
        if enabled {
            tracing::info!("Start polling per user request");
            self.set_enabled(true);
            self.start_job_queue();
        } else {
            tracing::info!("Stop polling per user request");
            self.set_enabled(false);
        }
    }

    fn on_event(&mut self, event: PrinterEvent) {
        tracing::debug!("Printer event: {:?}", event);
        self.state.last_event = Some(event.kind());
        match event {
            PrinterEvent::Startup | PrinterEvent::SettingsUpdated => self.reload_settings(),
            PrinterEvent::Connected => self.on_connected(),
            PrinterEvent::Disconnected => {
                if running(&self.job_queue) {
                    tracing::debug!("Printer disconnected");
                }
                self.stop_job_queue();
            }
            PrinterEvent::ConnectivityChanged { online } => self.on_connectivity(online),
            PrinterEvent::PrintStarted { path } => {
                if self.state.current_job.is_some() && is_managed_path(&path) {
                    tracing::info!("Print started for {}, pausing job queue", path);
                    self.stop_job_queue();
                    self.start_print_status();
                    self.ctx.notifier.send(Notification::job(path, NotificationStatus::PrintStarted));
                }
            }
            PrinterEvent::PrintDone { path } => {
                if self.state.current_job.is_some() {
                    self.on_print_done(path);
                }
            }
            PrinterEvent::PrintCancelled { path } => {
                if self.state.current_job.is_some() {
                    tracing::info!("Print job cancelled for {}", path);
                }
            }
            PrinterEvent::PrintFailed { path } => {
                if self.state.current_job.is_some() {
                    tracing::warn!("Print job failed for {}", path);
                    // The bed still holds the failed part until someone clears it.
                    if !self.ctx.config().autodrop.auto_eject_active {
                        self.ctx.notifier.send(Notification::job(path, NotificationStatus::PrintFailed));
                    }
                }
            }
        }
    }

    fn reload_settings(&mut self) {
        match self.ctx.settings.load() {
            Ok(config) => {
                let polling_enabled = config.autodrop.polling_enabled;
                self.ctx.config.send_replace(Arc::new(config));
                self.set_enabled(polling_enabled);
                tracing::info!("Settings loaded, polling enabled: {}", polling_enabled);
            }
            Err(e) => tracing::error!("Failed to load settings, keeping previous: {}", e),
        }
    }

    fn on_connected(&mut self) {
        if !self.state.enabled {
            return;
        }
        if !running(&self.job_queue) {
            tracing::debug!("Printer connected, starting job queue polling");
            self.start_job_queue();
        }
        // A job staged while the printer was away starts now instead of on the next tick.
        if self.state.bed_clear {
            if let Some(job) = self.state.current_job.clone() {
                tracing::info!("Printer connected, starting queued job {}", job.id);
                self.start_print(&job);
            }
        }
    }

    fn on_connectivity(&mut self, online: bool) {
        let polling_enabled = self.ctx.config().autodrop.polling_enabled;
        if online && polling_enabled {
            self.set_enabled(true);
            if self.ctx.device.is_ready() {
                tracing::info!("Internet up, start polling");
                self.start_job_queue();
            }
        } else {
            tracing::info!("No internet or polling disabled, stop polling");
            self.set_enabled(false);
        }
    }

    fn on_print_done(&mut self, path: String) {
        tracing::info!("Print done for {}", path);
        self.stop_print_status();
        if self.state.enabled {
            self.start_job_queue();
        }
        let config = self.ctx.config();
        if config.autodrop.notify_complete {
            let marker = config.storage.data_folder.join(NOTIFY_COMPLETE_FILE);
            tokio::spawn(async move {
                if let Some(parent) = marker.parent() {
                    let _ = tokio::fs::create_dir_all(parent).await;
                }
                match tokio::fs::write(&marker, b"").await {
                    Ok(()) => tracing::debug!("Wrote {}", marker.display()),
                    Err(e) => tracing::warn!("Failed to write {}: {}", marker.display(), e),
                }
            });
        }
        if !config.autodrop.custom_script.trim().is_empty() {
            actions::spawn_action(
                self.ctx.actions.clone(),
                config.autodrop.custom_script.clone(),
                ActionInvocation::new("custom_script", vec![path.clone()]),
            );
        }
        if !config.autodrop.auto_eject_active {
            self.ctx.notifier.send(Notification::job(path, NotificationStatus::PrintDone));
        }
    }

    fn on_job_staged(&mut self, job: Job) {
        tracing::info!("Job {} staged at {}", job.id, job.staged_path);
        self.state.current_job = Some(job.clone());
        if self.state.bed_clear && self.ctx.device.is_ready() {
            self.start_print(&job);
        } else {
            tracing::info!("Printer not ready or bed not clear, job {} stays queued", job.id);
        }
    }

    /// Claim the bed and start `job`. The bed is given back if the printer refuses.
    fn start_print(&mut self, job: &Job) {
        self.state.bed_clear = false;
        if let Err(e) = self.ctx.device.select_and_print(&job.staged_path) {
            tracing::error!("Failed to start job {}: {}", job.id, e);
            self.state.bed_clear = true;
        }
    }

    fn confirm_bed_clear(&mut self) -> BedClearOutcome {
        let previous_event = self.state.last_event;
        self.state.bed_clear = true;
        if previous_event.is_some_and(EventKind::is_failure) {
            self.state.last_event = None;
        }
        let job = self.state.current_job.take();
        tracing::info!("Bed cleared, released job {:?}", job.as_ref().map(|j| j.id.as_str()));
        BedClearOutcome { job, previous_event, enabled: self.state.enabled }
    }

    fn on_remote_cancel(&mut self, file_path: Option<String>) {
        tracing::info!("Job cancelled remotely");
        if self.ctx.device.is_printing() {
            if let Err(e) = self.ctx.device.cancel_print() {
                tracing::error!("Failed to cancel print: {}", e);
            }
        }
        self.stop_print_status();
        if self.state.enabled {
            self.start_job_queue();
        }
        if !self.ctx.config().autodrop.auto_eject_active {
            let filename = file_path
                .or_else(|| self.state.current_job.as_ref().map(|j| j.staged_path.clone()))
                .unwrap_or_default();
            self.ctx.notifier.send(Notification::job(filename, NotificationStatus::PrintCancelled));
        }
    }

    fn start_job_queue(&mut self) {
        if running(&self.job_queue) {
            return;
        }
        let poller = self.job_queue_poller.clone();
        self.job_queue = Some(self.start_poller("job_queue", move || {
            let poller = poller.clone();
            async move { poller.tick().await }
        }));
    }

    fn start_print_status(&mut self) {
        if running(&self.print_status) {
            return;
        }
        let reporter = self.print_status_reporter.clone();
        self.print_status = Some(self.start_poller("print_status", move || {
            let reporter = reporter.clone();
            async move { reporter.tick().await }
        }));
    }

    fn start_poller<A, Fut>(&self, name: &'static str, action: A) -> TaskHandle
    where
        A: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = crate::error::AgentResult<()>> + Send + 'static,
    {
        let period = self.ctx.config().autodrop.polling_period();
        let enabled = self.enabled_tx.subscribe();
        tracing::debug!("Starting {} poller every {:?}", name, period);
        RepeatedTask::start(
            name,
            period,
            action,
            move || *enabled.borrow(),
            move || tracing::debug!("Polling canceled for {}", name),
        )
    }

    fn stop_job_queue(&mut self) {
        if let Some(handle) = self.job_queue.take() {
            handle.stop();
        }
    }

    fn stop_print_status(&mut self) {
        if let Some(handle) = self.print_status.take() {
            handle.stop();
        }
    }
}

fn running(handle: &Option<TaskHandle>) -> bool {
    handle.as_ref().is_some_and(TaskHandle::is_running)
}
