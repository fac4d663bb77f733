//! Wiring of the agent: collaborators, the coordinator task and the handle the
//! rest of the program talks to.

use autodrop_shared::{
    ControlCommand, ControlResponse, DeviceControl, FileStaging, JobId, Notification, PrinterEvent,
    STAGING_NAMESPACE,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::actions::UntrustedAction;
use crate::config::{AgentConfig, DEFAULT_SERVER_URL};
use crate::connection::IpResolver;
use crate::coordinator::{AgentCommand, AgentSnapshot, BedClearOutcome, Coordinator};
use crate::error::{AgentError, AgentResult, ControlError};
use crate::intercept::CommandInterceptor;
use crate::notify::Notifier;
use crate::pollers::{JobQueuePoller, PrintStatusReporter};
use crate::remote::RemoteQueueClient;
use crate::settings::SettingsStore;
use crate::snapshot::SnapshotProvider;

const COMMAND_QUEUE: usize = 64;

/// External collaborators the agent drives.
pub struct AgentDeps {
    pub device: Arc<dyn DeviceControl>,
    pub staging: Arc<dyn FileStaging>,
    pub camera: Arc<dyn SnapshotProvider>,
    pub settings: Arc<dyn SettingsStore>,
    pub actions: Arc<dyn UntrustedAction>,
}

/// Everything a poller tick or the coordinator needs, shared read-only.
pub(crate) struct AgentContext {
    pub(crate) device: Arc<dyn DeviceControl>,
    pub(crate) staging: Arc<dyn FileStaging>,
    pub(crate) camera: Arc<dyn SnapshotProvider>,
    pub(crate) settings: Arc<dyn SettingsStore>,
    pub(crate) actions: Arc<dyn UntrustedAction>,
    pub(crate) client: RemoteQueueClient,
    pub(crate) ip: IpResolver,
    pub(crate) notifier: Notifier,
    /// Current configuration; only the coordinator publishes new values.
    pub(crate) config: watch::Sender<Arc<AgentConfig>>,
    commands: mpsc::Sender<AgentCommand>,
}

impl AgentContext {
    pub(crate) fn config(&self) -> Arc<AgentConfig> {
        self.config.borrow().clone()
    }

    pub(crate) async fn submit(&self, command: AgentCommand) -> AgentResult<()> {
        self.commands.send(command).await.map_err(|_| AgentError::CoordinatorGone)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> AgentCommand) -> AgentResult<T> {
        let (respond_to, response) = oneshot::channel();
        self.submit(make(respond_to)).await?;
        response.await.map_err(|_| AgentError::CoordinatorGone)
    }

    pub(crate) async fn snapshot(&self) -> AgentResult<AgentSnapshot> {
        self.request(|respond_to| AgentCommand::Snapshot { respond_to }).await
    }

    pub(crate) async fn confirm_bed_clear(&self) -> AgentResult<BedClearOutcome> {
        self.request(|respond_to| AgentCommand::ConfirmBedClear { respond_to }).await
    }
}

pub struct Agent;

impl Agent {
    /// Load the initial configuration and start the coordinator task.
    ///
    /// The agent stays disabled until it receives [`PrinterEvent::Startup`].
    pub fn spawn(deps: AgentDeps) -> AgentResult<AgentHandle> {
        let config = deps.settings.load()?;
        let client = RemoteQueueClient::new(Duration::from_secs(config.http.timeout))?;
        let ip = IpResolver::new(&config.online_check);
        let (config_tx, _) = watch::channel(Arc::new(config));
        let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE);

        let ctx = Arc::new(AgentContext {
            device: deps.device,
            staging: deps.staging,
            camera: deps.camera,
            settings: deps.settings,
            actions: deps.actions,
            client,
            ip,
            notifier: Notifier::default(),
            config: config_tx,
            commands,
        });
        let interceptor = Arc::new(CommandInterceptor::new(
            ctx.config.subscribe(),
            ctx.device.clone(),
            ctx.actions.clone(),
        ));
        let job_queue = JobQueuePoller::new(ctx.clone());
        let print_status = PrintStatusReporter::new(ctx.clone());
        let coordinator = Coordinator::new(ctx.clone(), job_queue.clone(), print_status.clone());
        tokio::spawn(coordinator.run(command_rx));

        Ok(AgentHandle { ctx, interceptor, job_queue, print_status })
    }
}

/// Cloneable entry point into a running agent.
#[derive(Clone)]
pub struct AgentHandle {
    ctx: Arc<AgentContext>,
    interceptor: Arc<CommandInterceptor>,
    job_queue: JobQueuePoller,
    print_status: PrintStatusReporter,
}

impl AgentHandle {
    pub async fn dispatch(&self, event: PrinterEvent) -> AgentResult<()> {
        self.ctx.submit(AgentCommand::Event(event)).await
    }

    /// Feed events from a device or monitor channel into the agent until either side closes.
    pub fn forward_events(&self, mut events: mpsc::UnboundedReceiver<PrinterEvent>) -> JoinHandle<()> {
        let agent = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if agent.dispatch(event).await.is_err() {
                    break;
                }
            }
        })
    }

    pub async fn snapshot(&self) -> AgentResult<AgentSnapshot> {
        self.ctx.snapshot().await
    }

    pub fn config(&self) -> Arc<AgentConfig> {
        self.ctx.config()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.ctx.notifier.subscribe()
    }

    /// Protocol hooks to install on the device transport.
    pub fn interceptor(&self) -> Arc<CommandInterceptor> {
        self.interceptor.clone()
    }

    pub fn job_queue_poller(&self) -> &JobQueuePoller {
        &self.job_queue
    }

    pub fn print_status_reporter(&self) -> &PrintStatusReporter {
        &self.print_status
    }

    pub async fn shutdown(&self) {
        let _ = self.ctx.submit(AgentCommand::Shutdown).await;
    }

    /// Execute a control API command.
    pub async fn control(&self, command: ControlCommand) -> Result<ControlResponse, ControlError> {
        match command {
            ControlCommand::GetDefaultServerUrl => {
                Ok(ControlResponse::DefaultServerUrl { url: DEFAULT_SERVER_URL.to_string() })
            }
            ControlCommand::BedCleared { filename } => self.bed_cleared(&filename).await,
            ControlCommand::Connect | ControlCommand::Disconnect => {
                let want = command == ControlCommand::Connect;
                let enabled = self
                    .ctx
                    .request(|respond_to| AgentCommand::SetEnabled { enabled: want, respond_to })
                    .await?;
                self.persist_polling(enabled).await?;
                Ok(ControlResponse::Enabled { enabled })
            }
        }
    }

    /// Save a changed polling choice and reload settings from the store.
    async fn persist_polling(&self, enabled: bool) -> AgentResult<()> {
        if self.config().autodrop.polling_enabled == enabled {
            return Ok(());
        }
        match self.ctx.settings.set_polling_enabled(enabled) {
            Ok(()) => self.dispatch(PrinterEvent::SettingsUpdated).await,
            Err(e) => {
                tracing::error!("Failed to save polling_enabled={}: {}", enabled, e);
                Ok(())
            }
        }
    }

    /// Manual bed-clear confirmation for the job staged as `filename`.
    async fn bed_cleared(&self, filename: &str) -> Result<ControlResponse, ControlError> {
        if filename.trim().is_empty() {
            return Err(ControlError::MissingFilename);
        }
        match self.ctx.staging.remove(STAGING_NAMESPACE, filename).await {
            Ok(()) => tracing::debug!("Deleted job file {} from local storage", filename),
            Err(e) => tracing::warn!("Unable to delete job file {} from local storage: {}", filename, e),
        }
        let outcome = self.ctx.confirm_bed_clear().await?;
        let cleared = ControlResponse::BedCleared { bed_cleared: true, enabled: outcome.enabled };
        // A failed or cancelled print has nothing to report as done.
        if outcome.previous_event.is_some_and(|kind| kind.is_failure()) {
            return Ok(cleared);
        }

        let job_id = JobId::from_path(filename);
        let config = self.config();
        let reply = async {
            let ip = self.ctx.ip.get().await?;
            self.ctx.client.notify_done(&config.autodrop, &ip, &job_id).await
        }
        .await;
        match reply {
            Ok(reply) if reply.is_ok() => {
                tracing::debug!("Server responded: {}", reply.text);
                Ok(cleared)
            }
            Ok(reply) => {
                tracing::warn!("Server responded {} to job {} done: {}", reply.status, job_id, reply.text);
                Ok(ControlResponse::UnknownResponse { filename: filename.to_string() })
            }
            Err(e) => {
                tracing::warn!("Failed to report job {} done: {}", job_id, e);
                Ok(ControlResponse::UnknownResponse { filename: filename.to_string() })
            }
        }
    }
}
