//! Wire models: control API requests/responses, the status report POSTed to the
//! remote queue, and notifications pushed to observers.

use serde::{Deserialize, Serialize};

/// Request body for the control endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    Disconnect,
    Connect,
    GetDefaultServerUrl,
    BedCleared { filename: String },
}

/// Response body for the control endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ControlResponse {
    BedCleared { bed_cleared: bool, enabled: bool },
    Enabled { enabled: bool },
    DefaultServerUrl { url: String },
    UnknownResponse {
        #[serde(rename = "unknown response")]
        filename: String,
    },
}

/// `jobStatus` field of a status report: completion percent or the cancel marker.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Canceled,
    Completion(Option<f64>),
}

impl Serialize for JobStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            JobStatus::Canceled => serializer.serialize_str("canceled"),
            JobStatus::Completion(Some(value)) => serializer.serialize_f64(*value),
            JobStatus::Completion(None) => serializer.serialize_none(),
        }
    }
}

/// Body of the periodic status POST.
#[derive(Serialize, Debug, Clone)]
pub struct StatusUpdate {
    #[serde(rename = "jobID")]
    pub job_id: String,
    pub name: String,
    pub key: String,
    pub stat: &'static str,
    #[serde(rename = "jobStatus")]
    pub job_status: JobStatus,
    pub img: String,
    pub ip: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    PrintStarted,
    PrintDone,
    PrintCancelled,
    PrintFailed,
    Error,
}

/// Message pushed to front-end observers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notification {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filename: Option<String>,
    pub status: NotificationStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl Notification {
    pub fn job(filename: impl Into<String>, status: NotificationStatus) -> Self {
        Self { filename: Some(filename.into()), status, error: None }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { filename: None, status: NotificationStatus::Error, error: Some(text.into()) }
    }
}
