// src/pollers/print_status.rs - Reports progress of the active job
use autodrop_shared::{EventKind, JobId, JobStatus, Notification, StatusUpdate};
use std::sync::Arc;

use crate::agent::AgentContext;
use crate::coordinator::AgentCommand;
use crate::error::AgentResult;
use crate::snapshot::snapshot_data_url;

#[derive(Clone)]
pub struct PrintStatusReporter {
    ctx: Arc<AgentContext>,
}

impl PrintStatusReporter {
    pub(crate) fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }

    pub async fn tick(&self) -> AgentResult<()> {
        tracing::debug!("Polling print status");
        let snapshot = self.ctx.snapshot().await?;
        let config = self.ctx.config();
        let progress = self.ctx.device.current_progress();

        let job_status = if snapshot.last_event.is_some_and(EventKind::is_failure) {
            JobStatus::Canceled
        } else {
            JobStatus::Completion(progress.completion)
        };
        let job_id = progress
            .file_path
            .as_deref()
            .map(JobId::from_path)
            .or_else(|| snapshot.current_job.as_ref().map(|job| job.id.clone()))
            .map(|id| id.to_string())
            .unwrap_or_default();
        let img = snapshot_data_url(self.ctx.camera.as_ref(), &config.webcam).await;
        let ip = self.ctx.ip.get().await?;

        let update = StatusUpdate {
            job_id,
            name: config.autodrop.name.clone(),
            key: config.autodrop.key.clone(),
            stat: "update",
            job_status,
            img,
            ip,
        };
        let reply = self.ctx.client.post_status(&config.autodrop, &update).await?;
        if reply.is_canceled() {
            tracing::info!("Server cancelled job {}", update.job_id);
            self.ctx.submit(AgentCommand::RemoteCancel { file_path: progress.file_path }).await?;
        } else if reply.is_ok() {
            tracing::debug!("Status update for {} answered {}", update.job_id, reply.text);
        } else {
            tracing::warn!("Error communicating status, {}: {}", reply.status, reply.text);
            self.ctx.notifier.send(Notification::error(format!("HTTP {}: {}", reply.status, reply.text)));
        }
        Ok(())
    }
}
