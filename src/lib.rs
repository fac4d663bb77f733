//! Printer-side agent for the Autodrop3D remote job queue.
//!
//! The agent pulls queued jobs, stages them for the printer, reports progress back
//! and reacts to remote cancellation, while following the printer's own lifecycle
//! events. See [`agent::Agent::spawn`] for the entry point.

pub mod actions;
pub mod agent;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod file_manager;
pub mod intercept;
pub mod notify;
pub mod pollers;
pub mod remote;
pub mod repeated_task;
pub mod settings;
pub mod snapshot;
pub mod web;

pub use agent::{Agent, AgentDeps, AgentHandle};
pub use coordinator::AgentSnapshot;
pub use error::{AgentError, AgentResult};
