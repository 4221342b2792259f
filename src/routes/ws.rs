//! WebSocket handler — bidirectional frame relay.
//!
//! DESIGN
//! ======
//! On upgrade, enters a `select!` loop:
//! - Incoming client frames → parse + dispatch through the coordinator
//! - Notification frames from peers → forward to this client
//!
//! The coordinator mutex is held for the whole of each dispatch, so a
//! connection's peer notifications are enqueued before its ack frame is
//! produced. Settlement dispatch happens after the lock is released, as a
//! fire-and-forget task.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → unauthenticated session (only `authenticate` passes the gate)
//! 2. Client sends frames → dispatch → ack (done or error)
//! 3. Close → same cleanup as an explicit logOut

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::UserError;
use crate::frame::{FRAME_ERROR_NAME, Frame, Status};
use crate::services::session::{Action, Session};
use crate::services::trade::TradePair;
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    // Per-connection channel for notification frames from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(256);
    let mut session = Session::new(client_tx);

    info!("ws: client connected");

    'conn: loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&state, &mut session, &text).await;
                        for frame in replies {
                            if send_frame(&mut socket, &frame).await.is_err() {
                                break 'conn;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    // Socket gone: run the same cleanup as an explicit logOut.
    if let Some(user) = session.user_id.take() {
        state.coordinator.lock().await.disconnect(&user);
        info!(%user, "ws: client disconnected");
    } else {
        info!("ws: client disconnected");
    }
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the
/// sender. Split out of the socket loop so tests can exercise dispatch and
/// fan-out end-to-end without a socket.
async fn process_inbound_text(state: &AppState, session: &mut Session, text: &str) -> Vec<Frame> {
    let req: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "ws: invalid inbound frame");
            let err = UserError::UnsupportedAction(format!("invalid json: {e}"));
            return vec![Frame::error_event(&err)];
        }
    };

    info!(id = %req.id, event = %req.event, "ws: recv frame");

    let action = match Action::from_frame(&req) {
        Ok(action) => action,
        Err(err) => return vec![req.error_from(&err)],
    };

    let result = {
        let mut coordinator = state.coordinator.lock().await;
        coordinator.handle(&state.verifier, session, action)
    };

    match result {
        Ok(completed) => {
            if let Some(pair) = completed {
                dispatch_settlement(state, pair);
            }
            vec![req.done()]
        }
        Err(err) => {
            if err.is_internal() {
                error!(error = %err, event = %req.event, "ws: internal error");
            }
            vec![req.error_from(&err)]
        }
    }
}

/// Fire-and-forget settlement dispatch; the pair is already final.
fn dispatch_settlement(state: &AppState, pair: TradePair) {
    let Some(client) = state.settlement.clone() else {
        warn!(
            u1 = %pair.a.user_id,
            u2 = %pair.b.user_id,
            "settlement not configured — completed trade not dispatched"
        );
        return;
    };
    tokio::spawn(async move {
        match client.perform_trade(&pair).await {
            Ok(()) => info!(u1 = %pair.a.user_id, u2 = %pair.b.user_id, "trade settled"),
            Err(e) => {
                error!(error = %e, u1 = %pair.a.user_id, u2 = %pair.b.user_id, "settlement dispatch failed");
            }
        }
    });
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let name = frame.data.get(FRAME_ERROR_NAME).and_then(|v| v.as_str()).unwrap_or("-");
        warn!(id = %frame.id, event = %frame.event, name, "ws: send error frame");
    } else {
        info!(id = %frame.id, event = %frame.event, status = ?frame.status, "ws: send frame");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
