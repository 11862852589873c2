//! Fan-out of change events to every connected client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ars_watch::ChangeEvent;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::codec::TransportCodec;
use super::message::ServerMessage;
use super::registry::{Channel, ConnectionId, ConnectionRegistry, Outbound, Visit};

/// Frames buffered per streaming connection before it counts as stalled.
const STREAM_BUFFER: usize = 32;

/// Dormant polling clients are forgotten after this many poll timeouts.
const DORMANT_TIMEOUTS: u32 = 10;

/// Hub settings.
#[derive(Clone, Copy, Debug)]
pub(crate) struct HubOptions {
    /// Named polling clients idle this long go dormant; they keep collecting
    /// reloads until `DORMANT_TIMEOUTS` times as long, then are dropped.
    pub(crate) poll_timeout: Duration,
}

/// Outcome of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Delivery {
    /// Polling connections whose pending flag was set.
    pub(crate) flagged: usize,
    /// Streaming connections the event was queued for.
    pub(crate) pushed: usize,
    /// Streaming connections removed because they were gone or stalled.
    pub(crate) dropped: usize,
}

/// Delivers change events to every registered connection.
#[derive(Debug)]
pub(crate) struct BroadcastHub {
    registry: ConnectionRegistry,
    options: HubOptions,
}

impl BroadcastHub {
    pub(crate) fn new(options: HubOptions) -> Self {
        let registry = ConnectionRegistry::new();
        registry.with_or_insert(
            ConnectionId::SHARED_POLL,
            || Channel::poll(Instant::now()),
            |_| (),
        );
        Self { registry, options }
    }

    /// Register a streaming connection that receives bytes encoded by `codec`.
    ///
    /// The connection is unregistered when the returned subscription drops.
    pub(crate) fn subscribe(self: &Arc<Self>, codec: Arc<dyn TransportCodec>) -> Subscription {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let name = codec.name();
        let id = self.registry.register(Channel::Stream { codec, tx });
        tracing::info!(
            %id,
            transport = name,
            connections = self.connection_count(),
            "Live reload client connected"
        );

        Subscription {
            id,
            rx,
            hub: Arc::clone(self),
        }
    }

    /// Read and clear the pending flag of a polling client.
    ///
    /// `None`, or an id that belongs to a streaming connection, uses the shared
    /// anonymous flag. Unknown ids are registered with a clear flag.
    pub(crate) fn poll(&self, client: Option<ConnectionId>) -> bool {
        let now = Instant::now();
        let id = client.unwrap_or(ConnectionId::SHARED_POLL);

        let taken = self.registry.with_or_insert(
            id,
            || Channel::poll(now),
            |connection| match &mut connection.channel {
                Channel::Poll {
                    pending_reload,
                    last_seen,
                } => {
                    *last_seen = now;
                    Some(std::mem::take(pending_reload))
                }
                Channel::Dormant { pending_reload, .. } => {
                    let pending = *pending_reload;
                    connection.channel = Channel::poll(now);
                    tracing::debug!(id = %connection.id, "Dormant polling client returned");
                    Some(pending)
                }
                Channel::Stream { .. } => None,
            },
        );

        match taken {
            Some(pending) => pending,
            None => self.poll(None),
        }
    }

    /// Deliver one change to every connection exactly once.
    ///
    /// Never blocks on a client: streaming connections that are closed or
    /// whose buffer is full are unregistered instead.
    pub(crate) fn broadcast(&self, change: &ChangeEvent) -> Delivery {
        let message = ServerMessage::from_change(change);
        let mut delivery = Delivery::default();

        self.registry.for_each(|connection| match &mut connection.channel {
            Channel::Poll { pending_reload, .. } | Channel::Dormant { pending_reload, .. } => {
                *pending_reload = true;
                delivery.flagged += 1;
                Visit::Keep
            }
            Channel::Stream { codec, tx } => {
                let last = codec.closes_after_update();
                let outbound = Outbound {
                    bytes: codec.encode(&message),
                    last,
                };
                match tx.try_send(outbound) {
                    Ok(()) => {
                        delivery.pushed += 1;
                        if last { Visit::Remove } else { Visit::Keep }
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(id = %connection.id, "Client gone, unregistering");
                        delivery.dropped += 1;
                        Visit::Remove
                    }
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(id = %connection.id, "Client stalled, unregistering");
                        delivery.dropped += 1;
                        Visit::Remove
                    }
                }
            }
        });

        delivery
    }

    /// Remove a connection. Repeated calls are no-ops.
    pub(crate) fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.registry.unregister(id);
        if removed {
            tracing::info!(%id, "Live reload client disconnected");
        }
        removed
    }

    /// Put named polling clients not seen within the poll timeout to sleep and
    /// forget dormant ones idle for `DORMANT_TIMEOUTS` timeouts.
    ///
    /// Returns how many clients were forgotten.
    pub(crate) fn sweep_idle_polls(&self, now: Instant) -> usize {
        let timeout = self.options.poll_timeout;
        let expiry = timeout.saturating_mul(DORMANT_TIMEOUTS);
        let mut slept = 0;

        let removed = self.registry.for_each(|connection| {
            if connection.id == ConnectionId::SHARED_POLL {
                return Visit::Keep;
            }
            match connection.channel {
                Channel::Poll {
                    pending_reload,
                    last_seen,
                } if now.saturating_duration_since(last_seen) > timeout => {
                    connection.channel = Channel::Dormant {
                        pending_reload,
                        last_seen,
                    };
                    slept += 1;
                    Visit::Keep
                }
                Channel::Dormant { last_seen, .. }
                    if now.saturating_duration_since(last_seen) > expiry =>
                {
                    Visit::Remove
                }
                _ => Visit::Keep,
            }
        });

        if slept > 0 || removed > 0 {
            tracing::debug!(slept, removed, "Swept idle polling clients");
        }
        removed
    }

    /// Disconnect every streaming connection, e.g. on shutdown.
    pub(crate) fn close_streams(&self) -> usize {
        self.registry
            .for_each(|connection| match connection.channel {
                Channel::Stream { .. } => Visit::Remove,
                Channel::Poll { .. } | Channel::Dormant { .. } => Visit::Keep,
            })
    }

    pub(crate) fn poll_timeout(&self) -> Duration {
        self.options.poll_timeout
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: ConnectionId) -> bool {
        self.registry.contains(id)
    }

    /// Number of registered connections, including the shared polling one.
    pub(crate) fn connection_count(&self) -> usize {
        self.registry.len()
    }
}

/// A registered streaming connection and its queue of outbound bytes.
///
/// Dropping it unregisters the connection.
#[derive(Debug)]
pub(crate) struct Subscription {
    pub(crate) id: ConnectionId,
    pub(crate) rx: mpsc::Receiver<Outbound>,
    hub: Arc<BroadcastHub>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}
