//! Live reload notifications.
//!
//! File changes reach the [`hub::BroadcastHub`], which fans them out to every
//! client registered in the [`registry::ConnectionRegistry`]. Clients connect
//! to one endpoint that negotiates the transport per request:
//!
//! 1. `Upgrade: websocket` with a key: hand-rolled WebSocket
//! 2. `Accept: text/event-stream`: server-sent events
//! 3. anything else: a JSON poll answer

pub(crate) mod client;
mod codec;
pub(crate) mod hub;
mod message;
mod poll;
mod registry;
mod sse;
mod websocket;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::response::Response;

use crate::state::AppState;
use websocket::handshake::{self, HandshakeError};

/// Path of the notification endpoint.
pub(crate) const EVENTS_PATH: &str = "/autoreload-events";

/// Handle `GET /autoreload-events` for every transport.
pub(crate) async fn events_handler(State(state): State<Arc<AppState>>, req: Request) -> Response {
    match handshake::negotiate(req.headers()) {
        Ok(accept) => return websocket::upgrade(&state, req, &accept),
        Err(HandshakeError::MissingKey) => {
            tracing::debug!("WebSocket upgrade without key, falling through");
        }
        Err(HandshakeError::MissingUpgrade) => {}
    }

    if sse::accepts_event_stream(req.headers()) {
        return sse::stream(&state);
    }

    poll::respond(&state, req.uri())
}
