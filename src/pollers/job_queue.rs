// src/pollers/job_queue.rs - Pulls work from the remote queue
use autodrop_shared::{Job, JobId, Notification, STAGING_NAMESPACE};
use std::sync::Arc;

use crate::agent::AgentContext;
use crate::coordinator::{AgentCommand, AgentSnapshot};
use crate::config::AgentConfig;
use crate::error::AgentResult;
use crate::remote::QueueResponse;

const START_MARKER: &str = ";START";

/// Extract the job id from a queue response body.
///
/// A job body opens with `;START`, then a separator line, then `;<jobId>`.
/// Anything else means no job is queued.
pub fn parse_queue_body(body: &str) -> Option<JobId> {
    let mut lines = body.lines();
    if !lines.next()?.trim().starts_with(START_MARKER) {
        return None;
    }
    lines.next();
    let raw = lines.next()?.replace(';', "");
    let id = JobId::from_path(raw.trim());
    (!id.is_empty()).then_some(id)
}

#[derive(Clone)]
pub struct JobQueuePoller {
    ctx: Arc<AgentContext>,
}

impl JobQueuePoller {
    pub(crate) fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }

    pub async fn tick(&self) -> AgentResult<()> {
        let snapshot = self.ctx.snapshot().await?;
        let config = self.ctx.config();
        if !snapshot.bed_clear {
            if !config.autodrop.auto_eject_active {
                tracing::debug!("Bypass polling since bed is not clear");
                return Ok(());
            }
            return self.auto_eject(&config, snapshot).await;
        }

        tracing::debug!("Polling job queue");
        let ip = self.ctx.ip.get().await?;
        match self.ctx.client.request_job(&config.autodrop, &ip).await? {
            QueueResponse::Job(body) => {
                let Some(id) = parse_queue_body(&body) else {
                    tracing::debug!("No job queued");
                    return Ok(());
                };
                tracing::info!("Received job {}", id);
                let job = Job::new(id);
                let stored = self
                    .ctx
                    .staging
                    .write(STAGING_NAMESPACE, &job.staged_path, body.as_bytes(), true)
                    .await?;
                self.ctx.submit(AgentCommand::JobStaged { job: Job { staged_path: stored, ..job } }).await?;
            }
            QueueResponse::Empty => tracing::debug!("No job queued"),
            QueueResponse::Unexpected { status, text } => {
                tracing::warn!("Error downloading job, status {}: {}", status, text);
                self.ctx.notifier.send(Notification::error(format!("HTTP {}: {}", status, text)));
            }
        }
        Ok(())
    }

    /// The printer ejected the part on its own: release the bed and tell the queue.
    async fn auto_eject(&self, config: &AgentConfig, snapshot: AgentSnapshot) -> AgentResult<()> {
        // The bed is only empty once the print that claimed it has ended.
        if !self.ctx.device.is_ready() {
            tracing::debug!("Waiting for the printer to go idle before clearing the bed");
            return Ok(());
        }
        if let Some(job) = &snapshot.current_job {
            if let Err(e) = self.ctx.staging.remove(STAGING_NAMESPACE, &job.staged_path).await {
                tracing::warn!("Unable to delete job file {} from local storage: {}", job.staged_path, e);
            }
        }
        let outcome = self.ctx.confirm_bed_clear().await?;
        let Some(job) = outcome.job else {
            tracing::warn!("Bed cleared without a current job, nothing to report");
            return Ok(());
        };
        let ip = self.ctx.ip.get().await?;
        let job_id = JobId::from_path(&job.staged_path);
        match self.ctx.client.notify_done(&config.autodrop, &ip, &job_id).await {
            Ok(reply) => tracing::debug!("Server responded {}: {}", reply.status, reply.text),
            Err(e) => tracing::warn!("Failed to report job {} done: {}", job_id, e),
        }
        Ok(())
    }
}
