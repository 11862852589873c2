//! Recursive directory watcher.
//!
//! The notify callback only records into the debouncer. A tokio task drains
//! ready changes every [`DRAIN_INTERVAL`] and sends each non-empty batch down
//! a channel, so nothing downstream ever runs on the notify thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::debouncer::EventDebouncer;
use crate::error::WatchError;
use crate::event::{RawChange, classify};

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// How often the debouncer is checked for ready changes.
const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

/// Batches buffered between the drain task and the consumer.
const CHANNEL_CAPACITY: usize = 64;

/// Watches a directory tree and emits debounced batches of absolute paths.
#[derive(Clone, Debug)]
pub struct FileWatcher {
    root: PathBuf,
    debounce: Duration,
}

impl FileWatcher {
    /// Create a watcher for `root` with the default debounce window.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Set the debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching and receive raw change batches.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is missing, is not a directory, or the
    /// platform watcher cannot be attached to it.
    pub fn start(self) -> Result<(WatchHandle, mpsc::Receiver<Vec<RawChange>>), WatchError> {
        self.spawn(|batch| batch)
    }

    /// Start watching, passing every batch through `transform` on the drain task.
    ///
    /// Batches that `transform` empties are not sent.
    ///
    /// # Errors
    ///
    /// Same as [`FileWatcher::start`].
    pub fn spawn<T, F>(
        self,
        transform: F,
    ) -> Result<(WatchHandle, mpsc::Receiver<Vec<T>>), WatchError>
    where
        T: Send + 'static,
        F: Fn(Vec<RawChange>) -> Vec<T> + Send + 'static,
    {
        let root = resolve_root(&self.root)?;
        let debouncer = Arc::new(EventDebouncer::new(self.debounce));

        let recorder = Arc::clone(&debouncer);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for (path, kind) in classify(event) {
                        tracing::debug!(path = %path.display(), ?kind, "Recorded filesystem event");
                        recorder.record(path, kind);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Transient watch error, continuing"),
            }
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(DRAIN_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let ready = debouncer.drain_ready();
                if ready.is_empty() {
                    continue;
                }
                let batch = transform(ready);
                if batch.is_empty() {
                    continue;
                }
                if tx.send(batch).await.is_err() {
                    tracing::debug!("Change receiver dropped, stopping drain task");
                    break;
                }
            }
        });

        tracing::info!(root = %root.display(), "File watcher started");

        Ok((
            WatchHandle {
                root,
                watcher: Some(watcher),
                task: Some(task),
            },
            rx,
        ))
    }
}

/// Resolve the watched root to a canonical directory path.
pub(crate) fn resolve_root(root: &Path) -> Result<PathBuf, WatchError> {
    if !root.exists() {
        return Err(WatchError::RootNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(WatchError::NotADirectory(root.to_path_buf()));
    }
    Ok(root.canonicalize()?)
}

/// Keeps a watch alive. Dropping it stops the watch.
pub struct WatchHandle {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Canonical path of the watched root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the watch is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stop watching. Calling this more than once is a no-op.
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            tracing::info!(root = %self.root.display(), "File watcher stopped");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("root", &self.root)
            .field("running", &self.is_running())
            .finish()
    }
}
