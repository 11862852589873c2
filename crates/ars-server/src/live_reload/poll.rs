//! Polling transport: a plain JSON answer per request.

use axum::extract::Query;
use axum::http::{Uri, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use super::codec::{PollCodec, TransportCodec};
use super::message::ServerMessage;
use super::registry::ConnectionId;
use crate::state::AppState;

/// `?client=<uuid>` identifies a tab with its own pending flag.
#[derive(Debug, Default, Deserialize)]
struct PollQuery {
    client: Option<Uuid>,
}

fn client_id(uri: &Uri) -> Option<ConnectionId> {
    Query::<PollQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(query)| query.client)
        .map(ConnectionId::from)
}

/// Answer one poll, clearing the client's pending flag.
pub(crate) fn respond(state: &AppState, uri: &Uri) -> Response {
    let body = if state.hub.poll(client_id(uri)) {
        tracing::info!("Sending reload response to client");
        PollCodec.encode(&ServerMessage::reload())
    } else {
        PollCodec.heartbeat()
    };

    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}
