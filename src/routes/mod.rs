//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The server exposes exactly two endpoints: the trade WebSocket and a
//! liveness probe. Everything else — auth, invites, trades — happens
//! in-band on the socket.

pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
