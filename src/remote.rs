// src/remote.rs - HTTP client for the remote job queue
use autodrop_shared::{JobId, StatusUpdate};
use reqwest::{Client, StatusCode, header};
use std::time::Duration;

use crate::config::RemoteQueueConfig;
use crate::error::AgentResult;

/// Response text the server sends when the operator cancelled the job remotely.
pub const CANCELED: &str = "CANCELED";
/// Response text acknowledging a status update.
pub const RECORDED: &str = "RECORDED";

/// Outcome of asking the queue for work.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueResponse {
    /// 200 with a body; the body may still turn out not to be a job.
    Job(String),
    /// 404: nothing queued.
    Empty,
    Unexpected { status: u16, text: String },
}

/// Plain-text reply to a notification or status update.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReply {
    pub status: u16,
    pub text: String,
}

impl RemoteReply {
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK.as_u16()
    }

    pub fn is_canceled(&self) -> bool {
        self.is_ok() && self.text == CANCELED
    }
}

#[derive(Debug, Clone)]
pub struct RemoteQueueClient {
    http: Client,
}

impl RemoteQueueClient {
    pub fn new(timeout: Duration) -> AgentResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// GET the next job for this printer.
    pub async fn request_job(&self, cfg: &RemoteQueueConfig, ip: &str) -> AgentResult<QueueResponse> {
        tracing::debug!("Polling job queue at {}", cfg.server);
        let response = self
            .http
            .get(&cfg.server)
            .query(&[("name", cfg.name.as_str()), ("key", cfg.key.as_str()), ("ip", ip)])
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        Ok(match status {
            StatusCode::OK => QueueResponse::Job(text),
            StatusCode::NOT_FOUND => QueueResponse::Empty,
            other => QueueResponse::Unexpected { status: other.as_u16(), text },
        })
    }

    /// GET the "job done" acknowledgement once the bed has been cleared.
    pub async fn notify_done(&self, cfg: &RemoteQueueConfig, ip: &str, job_id: &JobId) -> AgentResult<RemoteReply> {
        tracing::debug!("Reporting job {} done", job_id);
        let response = self
            .http
            .get(&cfg.server)
            .query(&[
                ("name", cfg.name.as_str()),
                ("key", cfg.key.as_str()),
                ("ip", ip),
                ("jobID", job_id.as_str()),
                ("stat", "Done"),
            ])
            .send()
            .await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok(RemoteReply { status, text })
    }

    /// POST a progress report.
    pub async fn post_status(&self, cfg: &RemoteQueueConfig, update: &StatusUpdate) -> AgentResult<RemoteReply> {
        let response = self
            .http
            .post(&cfg.server)
            .header(header::ACCEPT, "text/plain")
            .json(update)
            .send()
            .await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok(RemoteReply { status, text })
    }
}
