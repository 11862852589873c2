//! Hand-rolled WebSocket transport.
//!
//! The handshake answers with `101 Switching Protocols`; the upgraded
//! connection is then driven by a [`session::WebSocketSession`] on its own task.

pub(crate) mod frame;
pub(crate) mod handshake;
mod session;

use std::sync::Arc;

use axum::extract::Request;
use axum::response::Response;
use hyper_util::rt::TokioIo;

use crate::state::AppState;
use session::WebSocketSession;

/// Complete the handshake and hand the connection to a session task.
pub(crate) fn upgrade(state: &Arc<AppState>, mut req: Request, accept: &str) -> Response {
    let on_upgrade = hyper::upgrade::on(&mut req);
    let hub = Arc::clone(&state.hub);
    let heartbeat = state.heartbeat;

    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                WebSocketSession::new(TokioIo::new(upgraded), hub)
                    .run(heartbeat)
                    .await;
            }
            Err(e) => tracing::warn!(error = %e, "WebSocket upgrade failed"),
        }
    });

    handshake::switching_protocols(accept)
}
