//! Request and response bodies of the web API that are not shared with the agent.

use serde::{Deserialize, Serialize};

use crate::coordinator::AgentSnapshot;

/// Represents a login request.
#[derive(Deserialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

/// Represents a login response with JWT token.
#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
}

/// Response of `GET /api/v1/autodrop3d/status`.
#[derive(Serialize, Debug)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub agent: AgentSnapshot,
    pub printer: String,
    pub server: String,
    pub auto_eject_active: bool,
    pub use_gpio: bool,
}
