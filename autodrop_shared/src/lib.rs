// autodrop_shared: collaborator traits and types shared by the agent and the printer simulator

pub mod api_models;
pub mod device;
pub mod events;
pub mod job;
pub mod protocol;
pub mod staging;

pub use api_models::{
    ControlCommand, ControlResponse, JobStatus, Notification, NotificationStatus, StatusUpdate,
};
pub use device::{DeviceControl, DeviceError, Progress};
pub use events::{EventKind, PrinterEvent};
pub use job::{Job, JobId, MANAGED_FOLDER, STAGING_NAMESPACE};
pub use protocol::ProtocolHooks;
pub use staging::{FileStaging, StagingError};
