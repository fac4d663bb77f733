//! The two periodic workers driven by the coordinator.
//!
//! Each tick reads an [`AgentSnapshot`](crate::coordinator::AgentSnapshot), does its
//! network and file work on its own task and hands the result back to the
//! coordinator as an intent.

pub mod job_queue;
pub mod print_status;

pub use job_queue::{JobQueuePoller, parse_queue_body};
pub use print_status::PrintStatusReporter;
