//! One WebSocket connection after a successful handshake.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{self, Instant};

use super::frame;
use crate::live_reload::codec::{TransportCodec, WebSocketCodec};
use crate::live_reload::hub::{BroadcastHub, Subscription};
use crate::live_reload::message::ServerMessage;
use crate::live_reload::registry::Outbound;

/// A write that doesn't finish in this time counts as a failed write.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Inbound bytes are drained through a buffer of this size and discarded.
const READ_BUFFER: usize = 1024;

/// Lifecycle of a WebSocket connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SessionState {
    Handshaking,
    Open,
    Closing,
    Closed,
}

/// Why an open session stopped.
#[derive(Debug)]
enum CloseReason {
    /// The client closed its end (zero-length read).
    PeerClosed,
    /// The client sent a close frame; ours answers it.
    PeerClosing,
    Read(io::Error),
    Write(io::Error),
    WriteTimeout,
    /// The hub dropped the connection, e.g. on shutdown.
    Unregistered,
    /// The last queued frame was written.
    Finished,
}

enum Step {
    Deliver(Option<Outbound>),
    Heartbeat,
    Read(io::Result<usize>),
}

/// Pumps hub events to one client and drains whatever the client sends.
pub(crate) struct WebSocketSession<S> {
    io: S,
    hub: Arc<BroadcastHub>,
    subscription: Option<Subscription>,
    inbound: frame::InboundScanner,
    state: SessionState,
}

impl<S> WebSocketSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap the upgraded byte stream. Nothing is registered until [`run`](Self::run).
    pub(crate) fn new(io: S, hub: Arc<BroadcastHub>) -> Self {
        Self {
            io,
            hub,
            subscription: None,
            inbound: frame::InboundScanner::default(),
            state: SessionState::Handshaking,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    /// Serve the connection until either side ends it, then close it.
    pub(crate) async fn run(mut self, heartbeat: Duration) {
        let reason = self.pump(heartbeat).await;
        match &reason {
            CloseReason::Read(e) | CloseReason::Write(e) => {
                tracing::warn!(error = %e, "WebSocket connection failed");
            }
            CloseReason::WriteTimeout => tracing::warn!("WebSocket write timed out"),
            _ => tracing::debug!(?reason, "WebSocket connection ending"),
        }
        self.close().await;
    }

    /// Register with the hub and greet the client.
    async fn open(&mut self) -> Result<(), CloseReason> {
        self.subscription = Some(self.hub.subscribe(Arc::new(WebSocketCodec)));
        self.state = SessionState::Open;
        self.write(&WebSocketCodec.encode(&ServerMessage::Connected))
            .await
    }

    async fn pump(&mut self, heartbeat: Duration) -> CloseReason {
        if let Err(reason) = self.open().await {
            return reason;
        }

        let mut ticker = time::interval_at(Instant::now() + heartbeat, heartbeat);
        let mut buf = [0u8; READ_BUFFER];

        loop {
            let Some(subscription) = self.subscription.as_mut() else {
                return CloseReason::Unregistered;
            };

            let step = tokio::select! {
                outbound = subscription.rx.recv() => Step::Deliver(outbound),
                _ = ticker.tick() => Step::Heartbeat,
                read = self.io.read(&mut buf) => Step::Read(read),
            };

            let result = match step {
                Step::Deliver(Some(outbound)) => {
                    ticker.reset();
                    match self.write(&outbound.bytes).await {
                        Ok(()) if outbound.last => Err(CloseReason::Finished),
                        other => other,
                    }
                }
                Step::Deliver(None) => Err(CloseReason::Unregistered),
                Step::Heartbeat => self.write(&WebSocketCodec.heartbeat()).await,
                Step::Read(Ok(0)) => Err(CloseReason::PeerClosed),
                Step::Read(Ok(n)) => {
                    if self.inbound.feed(&buf[..n]) {
                        Err(CloseReason::PeerClosing)
                    } else {
                        Ok(())
                    }
                }
                Step::Read(Err(e)) => Err(CloseReason::Read(e)),
            };

            if let Err(reason) = result {
                return reason;
            }
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), CloseReason> {
        let write = async {
            self.io.write_all(bytes).await?;
            self.io.flush().await
        };
        match time::timeout(WRITE_TIMEOUT, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CloseReason::Write(e)),
            Err(_) => Err(CloseReason::WriteTimeout),
        }
    }

    /// Unregister, send a close frame and shut the socket. Repeated calls are no-ops.
    pub(crate) async fn close(&mut self) {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return;
        }
        self.state = SessionState::Closing;

        // Dropping the subscription unregisters the connection
        self.subscription = None;

        if let Err(reason) = self.write(&frame::encode_close()).await {
            tracing::debug!(?reason, "Could not send close frame");
        }
        if let Err(e) = self.io.shutdown().await {
            tracing::debug!(error = %e, "WebSocket shutdown failed");
        }

        self.state = SessionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_reload::hub::HubOptions;
    use ars_watch::{ChangeEvent, ChangeKind};
    use pretty_assertions::assert_eq;
    use tokio::io::DuplexStream;

    fn hub() -> Arc<BroadcastHub> {
        Arc::new(BroadcastHub::new(HubOptions {
            poll_timeout: Duration::from_secs(60),
        }))
    }

    /// Read one short unmasked text frame.
    async fn read_text(client: &mut DuplexStream) -> String {
        let mut header = [0u8; 2];
        client.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0], 0x81);
        let mut payload = vec![0u8; usize::from(header[1])];
        client.read_exact(&mut payload).await.unwrap();
        String::from_utf8(payload).unwrap()
    }

    #[tokio::test]
    async fn test_delivers_connected_then_update() {
        let hub = hub();
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(
            WebSocketSession::new(server, Arc::clone(&hub)).run(Duration::from_secs(30)),
        );

        assert_eq!(read_text(&mut client).await, r#"{"type":"connected"}"#);
        assert_eq!(hub.connection_count(), 2);

        hub.broadcast(&ChangeEvent::new("index.html", ChangeKind::Modified));

        assert_eq!(
            read_text(&mut client).await,
            r#"{"type":"update","reload":true,"path":"index.html","kind":"modified"}"#
        );

        drop(client);
        task.await.unwrap();
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_on_idle_connection() {
        let hub = hub();
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(
            WebSocketSession::new(server, Arc::clone(&hub)).run(Duration::from_millis(50)),
        );

        assert_eq!(read_text(&mut client).await, r#"{"type":"connected"}"#);
        assert_eq!(read_text(&mut client).await, r#"{"type":"heartbeat"}"#);

        drop(client);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_inbound_bytes_are_drained() {
        let hub = hub();
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(
            WebSocketSession::new(server, Arc::clone(&hub)).run(Duration::from_secs(30)),
        );
        read_text(&mut client).await;

        // A masked client ping; the contents are ignored
        client
            .write_all(&[0x89, 0x80, 0x01, 0x02, 0x03, 0x04])
            .await
            .unwrap();
        hub.broadcast(&ChangeEvent::new("a.html", ChangeKind::Added));

        assert!(read_text(&mut client).await.contains("a.html"));

        drop(client);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_close_frame_is_answered() {
        let hub = hub();
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(
            WebSocketSession::new(server, Arc::clone(&hub)).run(Duration::from_secs(30)),
        );
        read_text(&mut client).await;

        // Masked close with status 1000
        client
            .write_all(&[0x88, 0x82, 0x00, 0x00, 0x00, 0x00, 0x03, 0xE8])
            .await
            .unwrap();

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, vec![0x88, 0x00]);

        task.await.unwrap();
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let hub = hub();
        let (mut client, server) = tokio::io::duplex(4096);
        let mut session = WebSocketSession::new(server, Arc::clone(&hub));
        assert_eq!(session.state(), SessionState::Handshaking);

        assert!(session.open().await.is_ok());
        assert_eq!(session.state(), SessionState::Open);

        session.close().await;
        session.close().await;

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(hub.connection_count(), 1);

        read_text(&mut client).await;
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, vec![0x88, 0x00]);
    }

    #[tokio::test]
    async fn test_hub_shutdown_sends_close_frame() {
        let hub = hub();
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(
            WebSocketSession::new(server, Arc::clone(&hub)).run(Duration::from_secs(30)),
        );
        read_text(&mut client).await;

        assert_eq!(hub.close_streams(), 1);
        task.await.unwrap();

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, vec![0x88, 0x00]);
    }
}
