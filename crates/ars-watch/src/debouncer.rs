//! Event debouncing.
//!
//! Coalesces the burst of raw notifications an editor produces for one save
//! into a single change per path. Each new event for a path pushes its
//! deadline back, so a path is only emitted once it has been quiet for the
//! whole debounce window.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::event::{ChangeKind, RawChange};

/// Pending change waiting for its deadline.
struct PendingChange {
    kind: ChangeKind,
    deadline: Instant,
}

/// Thread-safe change debouncer.
pub(crate) struct EventDebouncer {
    pending: Mutex<HashMap<PathBuf, PendingChange>>,
    window: Duration,
}

impl EventDebouncer {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Record a raw change. Called from the notify thread.
    pub(crate) fn record(&self, path: PathBuf, kind: ChangeKind) {
        use std::collections::hash_map::Entry;

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let deadline = Instant::now() + self.window;

        match pending.entry(path) {
            Entry::Vacant(entry) => {
                entry.insert(PendingChange { kind, deadline });
            }
            Entry::Occupied(mut entry) => {
                if let Some(kind) = Self::coalesce(entry.get().kind, kind) {
                    let pending = entry.get_mut();
                    pending.kind = kind;
                    pending.deadline = deadline;
                } else {
                    // Added then removed inside one window: nothing to report
                    entry.remove();
                }
            }
        }
    }

    /// Coalesce two kinds for the same path. `None` discards both.
    #[allow(clippy::match_same_arms)]
    fn coalesce(existing: ChangeKind, new: ChangeKind) -> Option<ChangeKind> {
        use ChangeKind::{Added, Modified, Removed};

        match (existing, new) {
            (Added, Added) => Some(Added),
            (Added, Modified) => Some(Added),
            (Added, Removed) => None,

            (Modified, Added) => Some(Added),
            (Modified, Modified) => Some(Modified),
            (Modified, Removed) => Some(Removed),

            // Write-temp-then-rename saves land here
            (Removed, Added) => Some(Modified),
            (Removed, Modified) => Some(Removed),
            (Removed, Removed) => Some(Removed),
        }
    }

    /// Take every change whose deadline has passed, sorted by path.
    pub(crate) fn drain_ready(&self) -> Vec<RawChange> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        let mut ready = Vec::new();
        pending.retain(|path, change| {
            if change.deadline <= now {
                ready.push(RawChange {
                    path: path.clone(),
                    kind: change.kind,
                });
                false
            } else {
                true
            }
        });

        ready.sort_by(|a, b| a.path.cmp(&b.path));
        ready
    }

    /// Number of paths still waiting for their deadline.
    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
