//! Registry of connected live reload clients.
//!
//! All connection state, including every polling client's pending flag,
//! lives behind one mutex. Callbacks run with the lock held and must not
//! block; streaming connections are only ever handed bytes through a
//! non-blocking `try_send`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use axum::body::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::codec::TransportCodec;

/// Unique identifier of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ConnectionId(Uuid);

impl ConnectionId {
    /// The polling connection shared by clients that don't identify themselves.
    pub(crate) const SHARED_POLL: Self = Self(Uuid::nil());

    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Encoded bytes queued for a streaming connection.
#[derive(Debug)]
pub(crate) struct Outbound {
    pub(crate) bytes: Bytes,
    /// The connection ends after writing this.
    pub(crate) last: bool,
}

/// How a connection receives events.
pub(crate) enum Channel {
    /// Pull delivery: the flag is read and cleared by the next poll.
    Poll {
        pending_reload: bool,
        last_seen: Instant,
    },
    /// A polling client that stopped polling. Still flagged by broadcasts so
    /// a returning tab picks up the reload it missed.
    Dormant {
        pending_reload: bool,
        last_seen: Instant,
    },
    /// Push delivery through the connection's own writer task.
    Stream {
        codec: Arc<dyn TransportCodec>,
        tx: mpsc::Sender<Outbound>,
    },
}

impl Channel {
    pub(crate) fn poll(now: Instant) -> Self {
        Self::Poll {
            pending_reload: false,
            last_seen: now,
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poll { pending_reload, .. } => f
                .debug_struct("Poll")
                .field("pending_reload", pending_reload)
                .finish_non_exhaustive(),
            Self::Dormant { pending_reload, .. } => f
                .debug_struct("Dormant")
                .field("pending_reload", pending_reload)
                .finish_non_exhaustive(),
            Self::Stream { codec, .. } => f
                .debug_struct("Stream")
                .field("codec", &codec.name())
                .finish_non_exhaustive(),
        }
    }
}

/// One live client channel.
#[derive(Debug)]
pub(crate) struct Connection {
    pub(crate) id: ConnectionId,
    pub(crate) channel: Channel,
}

/// What to do with a connection after visiting it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Visit {
    Keep,
    Remove,
}

/// Thread-safe map of connections.
#[derive(Debug, Default)]
pub(crate) struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection under a fresh id.
    pub(crate) fn register(&self, channel: Channel) -> ConnectionId {
        let id = ConnectionId::new();
        self.lock().insert(id, Connection { id, channel });
        id
    }

    /// Remove a connection. Unknown ids and repeated calls are no-ops.
    ///
    /// Returns whether the connection was present.
    pub(crate) fn unregister(&self, id: ConnectionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Visit every connection, removing those the callback rejects.
    ///
    /// Removal happens within the same locked pass, so a connection dropped
    /// while being visited never aborts delivery to the rest. Returns the
    /// number of connections removed.
    pub(crate) fn for_each(&self, mut visit: impl FnMut(&mut Connection) -> Visit) -> usize {
        let mut connections = self.lock();
        let before = connections.len();
        connections.retain(|_, connection| visit(connection) == Visit::Keep);
        before - connections.len()
    }

    /// Run `f` on the connection with `id`, creating it with `make` if absent.
    pub(crate) fn with_or_insert<R>(
        &self,
        id: ConnectionId,
        make: impl FnOnce() -> Channel,
        f: impl FnOnce(&mut Connection) -> R,
    ) -> R {
        let mut connections = self.lock();
        let connection = connections.entry(id).or_insert_with(|| Connection {
            id,
            channel: make(),
        });
        f(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_reload::codec::SseCodec;

    fn stream_channel() -> (Channel, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(4);
        let channel = Channel::Stream {
            codec: Arc::new(SseCodec),
            tx,
        };
        (channel, rx)
    }

    #[test]
    fn test_register_assigns_unique_ids() {
        let registry = ConnectionRegistry::new();

        let a = registry.register(Channel::poll(Instant::now()));
        let b = registry.register(Channel::poll(Instant::now()));

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(a));
        assert!(registry.contains(b));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(Channel::poll(Instant::now()));

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(!registry.unregister(ConnectionId::new()));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_for_each_removes_rejected_and_visits_rest() {
        let registry = ConnectionRegistry::new();
        let (gone, rx) = stream_channel();
        drop(rx);
        let gone = registry.register(gone);
        let kept = registry.register(Channel::poll(Instant::now()));

        let mut visited = 0;
        let removed = registry.for_each(|connection| {
            visited += 1;
            if connection.id == gone {
                Visit::Remove
            } else {
                Visit::Keep
            }
        });

        assert_eq!(visited, 2);
        assert_eq!(removed, 1);
        assert!(!registry.contains(gone));
        assert!(registry.contains(kept));
    }

    #[test]
    fn test_with_or_insert_creates_once() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();

        let mut created = 0;
        for _ in 0..3 {
            registry.with_or_insert(
                id,
                || {
                    created += 1;
                    Channel::poll(Instant::now())
                },
                |_| (),
            );
        }

        assert_eq!(created, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_register_and_iterate() {
        let registry = Arc::new(ConnectionRegistry::new());

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let id = registry.register(Channel::poll(Instant::now()));
                        registry.unregister(id);
                        registry.unregister(id);
                    }
                })
            })
            .collect();

        for _ in 0..100 {
            registry.for_each(|_| Visit::Keep);
        }
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(registry.len(), 0);
    }
}
