//! HTTP server with live reload for autoreload-web-server.
//!
//! Serves a directory over HTTP and tells connected browser tabs to reload
//! whenever a watched file changes:
//! - Static files, with a bootstrap script injected into HTML pages
//! - `GET /autoreload-events`, answered by polling, SSE or WebSocket
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use ars_server::{ServerConfig, run_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         root: PathBuf::from("site"),
//!         pattern: "**/*.html".to_owned(),
//!         ..ServerConfig::default()
//!     };
//!
//!     run_server(config).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! notify ──► ChangeFilter (ars-watch) ──► forwarder task ──► BroadcastHub
//!                                                               │
//!                      ┌──────────────────┬─────────────────────┤
//!                      ▼                  ▼                     ▼
//!               poll flag (JSON)    SSE stream body    WebSocket session task
//! ```

mod app;
mod error;
mod live_reload;
mod middleware;
mod state;
mod static_files;

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ars_config::Transport;
use ars_watch::{ChangeFilter, ChangeReceiver, DEFAULT_DEBOUNCE, WatchHandle};
use axum::Router;
use live_reload::hub::{BroadcastHub, HubOptions};
use state::AppState;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub use error::{ServerError, StartupError};
pub use live_reload::client::{client_script, inject_client_script};

/// Shortest heartbeat or sweep period; zero would spin.
const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on (0 lets the OS pick one).
    pub port: u16,
    /// Directory to serve and watch.
    pub root: PathBuf,
    /// Glob a changed path must match to trigger a reload.
    pub pattern: String,
    /// Globs excluded even when they match `pattern`.
    pub ignore: Vec<String>,
    /// Quiet period that collapses bursts of filesystem events.
    pub debounce: Duration,
    /// Transport the injected client script uses.
    pub transport: Transport,
    /// Heartbeat interval on idle streaming connections.
    pub heartbeat: Duration,
    /// How often the polling client polls, and the streaming clients' reconnect delay.
    pub poll_interval: Duration,
    /// Named polling clients silent this long are forgotten.
    pub poll_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 4000,
            root: PathBuf::from("."),
            pattern: "**/*".to_owned(),
            ignore: Vec::new(),
            debounce: DEFAULT_DEBOUNCE,
            transport: Transport::default(),
            heartbeat: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(60),
        }
    }
}

/// A bound server whose watcher is already running.
///
/// Binding and serving are separate so callers can learn the actual address
/// before accepting connections.
pub struct Server {
    listener: TcpListener,
    router: Router,
    hub: Arc<BroadcastHub>,
    watch: WatchHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    /// Start watching `config.root` and bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be watched or the address cannot be bound.
    pub async fn bind(config: ServerConfig) -> Result<Self, StartupError> {
        let (watch, changes) = ChangeFilter::new(&config.root, &config.pattern)
            .with_ignore(&config.ignore)
            .watch(config.debounce)?;
        tracing::info!(
            root = %watch.root().display(),
            pattern = %config.pattern,
            "File watcher started"
        );

        let hub = Arc::new(BroadcastHub::new(HubOptions {
            poll_timeout: config.poll_timeout.max(MIN_PERIOD),
        }));

        let state = Arc::new(AppState {
            root: watch.root().to_path_buf(),
            hub: Arc::clone(&hub),
            client_script: client_script(config.transport, config.poll_interval),
            heartbeat: config.heartbeat.max(MIN_PERIOD),
        });
        let router = app::create_router(state);

        let tasks = vec![
            tokio::spawn(forward_changes(changes, Arc::clone(&hub))),
            tokio::spawn(sweep_idle_polls(Arc::clone(&hub))),
        ];

        let address = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|source| StartupError::Bind { address, source })?;

        Ok(Self {
            listener,
            router,
            hub,
            watch,
            tasks,
        })
    }

    /// Address the server is listening on.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Directory being served.
    pub fn root(&self) -> &Path {
        self.watch.root()
    }

    /// Serve until `shutdown` resolves, then close streams and stop watching.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails while accepting connections.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), StartupError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            listener,
            router,
            hub,
            mut watch,
            tasks,
        } = self;

        // Streaming responses never finish on their own
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                let closed = hub.close_streams();
                tracing::debug!(closed, "Closed streaming connections");
            })
            .await;

        for task in &tasks {
            task.abort();
        }
        watch.stop();

        result.map_err(StartupError::Io)
    }
}

/// Broadcast every filtered change to connected clients.
async fn forward_changes(mut changes: ChangeReceiver, hub: Arc<BroadcastHub>) {
    while let Some(batch) = changes.recv().await {
        for change in batch {
            let delivery = hub.broadcast(&change);
            tracing::info!(
                path = %change.path,
                kind = change.kind.as_str(),
                pushed = delivery.pushed,
                flagged = delivery.flagged,
                dropped = delivery.dropped,
                "File changed"
            );
        }
    }
    tracing::debug!("Change stream closed");
}

/// Periodically forget polling clients that stopped polling.
async fn sweep_idle_polls(hub: Arc<BroadcastHub>) {
    let mut ticker = tokio::time::interval(hub.poll_timeout());
    loop {
        ticker.tick().await;
        hub.sweep_idle_polls(Instant::now());
    }
}

/// Run the server until Ctrl-C.
///
/// # Arguments
///
/// * `config` - Server configuration
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: ServerConfig) -> Result<(), StartupError> {
    let server = Server::bind(config).await?;
    tracing::info!(address = %server.local_addr()?, "Starting server");
    server.serve(shutdown_signal()).await
}

/// Wait for shutdown signal (Ctrl-C).
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from the loaded config file and CLI overrides.
#[must_use]
pub fn server_config_from_config(config: &ars_config::Config) -> ServerConfig {
    let watch = &config.watch_resolved;
    let live_reload = &config.live_reload;

    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        root: watch.directory.clone(),
        pattern: watch.pattern.clone(),
        ignore: watch.ignore.clone(),
        debounce: Duration::from_millis(watch.debounce_ms),
        transport: live_reload.transport,
        heartbeat: Duration::from_secs(live_reload.heartbeat_secs),
        poll_interval: Duration::from_millis(live_reload.poll_interval_ms),
        poll_timeout: Duration::from_secs(live_reload.poll_timeout_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 4000);
        assert_eq!(config.pattern, "**/*");
        assert_eq!(config.transport, Transport::WebSocket);
        assert_eq!(config.heartbeat, Duration::from_secs(30));
    }

    #[test]
    fn test_server_config_from_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("autoreload.toml"),
            "[server]\nport = 8080\n\n[watch]\npattern = \"**/*.html\"\ndebounce_ms = 250\n\n[live_reload]\ntransport = \"sse\"\n",
        )
        .unwrap();

        let config = ars_config::Config::load(
            Some(&dir.path().join("autoreload.toml")),
            None,
        )
        .unwrap();
        let server = server_config_from_config(&config);

        assert_eq!(server.port, 8080);
        assert_eq!(server.root, dir.path().join("."));
        assert_eq!(server.pattern, "**/*.html");
        assert_eq!(server.debounce, Duration::from_millis(250));
        assert_eq!(server.transport, Transport::Sse);
        assert_eq!(server.poll_interval, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_bind_fails_for_missing_root() {
        let config = ServerConfig {
            root: PathBuf::from("/nonexistent/autoreload/root"),
            port: 0,
            ..ServerConfig::default()
        };

        let result = Server::bind(config).await;

        assert!(matches!(result, Err(StartupError::Watch(_))));
    }
}
