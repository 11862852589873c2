//! Server-sent events transport.
//!
//! One long-lived `text/event-stream` response per client. The stream ends
//! right after an update so the reloading page opens a fresh one.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use futures_util::stream;
use tokio::time::{self, Instant, Interval};

use super::codec::{SseCodec, TransportCodec};
use super::hub::Subscription;
use super::message::ServerMessage;
use crate::state::AppState;

/// Whether the request asks for an event stream.
pub(crate) fn accepts_event_stream(headers: &axum::http::HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("text/event-stream"))
}

/// Register an SSE connection and stream its events.
pub(crate) fn stream(state: &AppState) -> Response {
    let subscription = state.hub.subscribe(Arc::new(SseCodec));
    let ticker = time::interval_at(Instant::now() + state.heartbeat, state.heartbeat);

    let connected = SseCodec.encode(&ServerMessage::Connected);
    let events = stream::once(async move { connected })
        .chain(stream::unfold(Some((subscription, ticker)), next_event))
        .map(Ok::<_, Infallible>);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(events),
    )
        .into_response()
}

type StreamState = Option<(Subscription, Interval)>;

/// Wait for the next queued event or heartbeat. `None` ends the response.
async fn next_event(state: StreamState) -> Option<(Bytes, StreamState)> {
    let (mut subscription, mut ticker) = state?;

    tokio::select! {
        outbound = subscription.rx.recv() => {
            let outbound = outbound?;
            ticker.reset();
            let next = (!outbound.last).then_some((subscription, ticker));
            Some((outbound.bytes, next))
        }
        _ = ticker.tick() => Some((SseCodec.heartbeat(), Some((subscription, ticker)))),
    }
}
