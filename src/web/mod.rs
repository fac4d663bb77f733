//! The web module for the control API.

pub mod api;
pub mod auth;
pub mod models;
pub mod token_blacklist;

pub use api::{AppState, AppStateInner, create_router};
