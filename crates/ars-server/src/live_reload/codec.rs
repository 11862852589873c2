//! Per-transport encodings of [`ServerMessage`].
//!
//! The hub never knows which transport a connection uses; it asks the
//! connection's codec for bytes. Adding a transport means adding a codec.

use std::fmt;

use axum::body::Bytes;

use super::message::ServerMessage;
use super::websocket::frame;

/// Turns messages into the bytes a transport writes to its client.
pub(crate) trait TransportCodec: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Encode one message.
    fn encode(&self, message: &ServerMessage) -> Bytes;

    /// Bytes sent on an otherwise idle connection.
    fn heartbeat(&self) -> Bytes {
        self.encode(&ServerMessage::Heartbeat)
    }

    /// Whether the stream ends right after an update is delivered.
    fn closes_after_update(&self) -> bool {
        false
    }
}

/// Plain JSON response bodies for the polling endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PollCodec;

impl TransportCodec for PollCodec {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn encode(&self, message: &ServerMessage) -> Bytes {
        Bytes::from(message.to_json())
    }

    fn heartbeat(&self) -> Bytes {
        self.encode(&ServerMessage::Ping)
    }
}

/// `data: <json>\n\n` server-sent events.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SseCodec;

impl TransportCodec for SseCodec {
    fn name(&self) -> &'static str {
        "sse"
    }

    fn encode(&self, message: &ServerMessage) -> Bytes {
        Bytes::from(format!("data: {}\n\n", message.to_json()))
    }

    // The client reconnects after reloading
    fn closes_after_update(&self) -> bool {
        true
    }
}

/// Unmasked WebSocket text frames.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct WebSocketCodec;

impl TransportCodec for WebSocketCodec {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn encode(&self, message: &ServerMessage) -> Bytes {
        Bytes::from(frame::encode_text(&message.to_json()))
    }
}
