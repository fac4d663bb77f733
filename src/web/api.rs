//! Defines the Axum API routes and handlers.

use autodrop_shared::ControlCommand;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use axum_extra::extract::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::agent::AgentHandle;
use crate::error::ControlError;
use crate::web::auth::{AuthBackend, Claims, ConfigAuthBackend, JwtKeys};
use crate::web::models::{AuthRequest, AuthResponse, StatusResponse};
use crate::web::token_blacklist::TokenBlacklist;

type BearerHeader = TypedHeader<Authorization<Bearer>>;

pub struct AppStateInner {
    pub agent: AgentHandle,
    pub auth_backend: Box<dyn AuthBackend>,
    pub token_blacklist: TokenBlacklist,
    pub jwt: JwtKeys,
}
pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// State authenticating against the users in the agent's configuration.
    pub fn new(agent: AgentHandle, jwt: JwtKeys) -> AppState {
        let auth_backend = Box::new(ConfigAuthBackend::new(agent.clone()));
        Arc::new(Self { agent, auth_backend, token_blacklist: TokenBlacklist::new(), jwt })
    }
}

/// Helper to create a JSON error response with a message and status code
fn json_error(message: &str, status: StatusCode) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, "Insufficient rights").into_response()
}

/// Creates the Axum router with all the API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/auth/login", post(auth_login))
        .route("/api/v1/auth/logout", post(auth_logout))
        .route("/api/v1/autodrop3d", post(control_handler))
        .route("/api/v1/autodrop3d/status", get(status_handler))
        .route("/api/v1/autodrop3d/events", get(events_handler))
        .with_state(state)
}

/// Claims of a valid, unrevoked bearer token.
fn authenticate(state: &AppStateInner, auth: Option<&BearerHeader>) -> Option<Claims> {
    let token = auth?.token();
    if state.token_blacklist.contains(token) {
        return None;
    }
    state.jwt.verify(token).ok()
}

/// POST /api/v1/auth/login
async fn auth_login(State(state): State<AppState>, Json(payload): Json<AuthRequest>) -> Response {
    let Some(user) = state.auth_backend.validate(&payload.username, &payload.password).await else {
        return json_error("Invalid credentials", StatusCode::UNAUTHORIZED);
    };
    match state.jwt.issue(&user) {
        Ok(token) => (StatusCode::OK, Json(AuthResponse { token })).into_response(),
        Err(e) => {
            tracing::error!("Failed to sign token for {}: {}", user.username, e);
            json_error("Internal error", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/v1/auth/logout -- revoke the current token
async fn auth_logout(State(state): State<AppState>, TypedHeader(auth): BearerHeader) -> Response {
    let token = auth.token();
    match state.jwt.verify(token) {
        Ok(claims) => {
            state.token_blacklist.insert(token.to_string(), claims.exp);
            (StatusCode::OK, Json(serde_json::json!({ "result": "ok" }))).into_response()
        }
        Err(_) => json_error("Invalid token", StatusCode::UNAUTHORIZED),
    }
}

/// POST /api/v1/autodrop3d -- control commands, admin only
async fn control_handler(State(state): State<AppState>, auth: Option<BearerHeader>, body: Bytes) -> Response {
    match authenticate(&state, auth.as_ref()) {
        Some(claims) if claims.admin => {}
        _ => return forbidden(),
    }
    let command: ControlCommand = match serde_json::from_slice(&body) {
        Ok(command) => command,
        Err(e) => return json_error(&format!("Invalid command: {}", e), StatusCode::BAD_REQUEST),
    };
    match state.agent.control(command).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(ControlError::MissingFilename) => json_error("filename is required", StatusCode::BAD_REQUEST),
        Err(ControlError::Agent(e)) => {
            tracing::error!("Control command failed: {}", e);
            json_error("Internal error", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/v1/autodrop3d/status
async fn status_handler(State(state): State<AppState>, auth: Option<BearerHeader>) -> Response {
    if authenticate(&state, auth.as_ref()).is_none() {
        return json_error("Invalid token", StatusCode::UNAUTHORIZED);
    }
    let agent = match state.agent.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!("Status unavailable: {}", e);
            return json_error("Internal error", StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let config = state.agent.config();
    let status = StatusResponse {
        agent,
        printer: config.autodrop.name.clone(),
        server: config.autodrop.server.clone(),
        auto_eject_active: config.autodrop.auto_eject_active,
        use_gpio: config.autodrop.use_gpio,
    };
    (StatusCode::OK, Json(status)).into_response()
}

/// GET /api/v1/autodrop3d/events -- notifications as server-sent events
async fn events_handler(State(state): State<AppState>, auth: Option<BearerHeader>) -> Response {
    if authenticate(&state, auth.as_ref()).is_none() {
        return json_error("Invalid token", StatusCode::UNAUTHORIZED);
    }
    let mut notifications = state.agent.subscribe();
    let stream = async_stream::stream! {
        loop {
            match notifications.recv().await {
                Ok(notification) => {
                    yield Event::default().event("autodrop3d").json_data(&notification);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event stream skipped {} notifications", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}
