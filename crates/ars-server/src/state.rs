//! Application state.
//!
//! Shared state for all request handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::live_reload::hub::BroadcastHub;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Canonical directory files are served from.
    pub(crate) root: PathBuf,
    /// Fan-out of file changes to live reload clients.
    pub(crate) hub: Arc<BroadcastHub>,
    /// Bootstrap script injected into every HTML page.
    pub(crate) client_script: String,
    /// Interval between heartbeats on idle streaming connections.
    pub(crate) heartbeat: Duration,
}
