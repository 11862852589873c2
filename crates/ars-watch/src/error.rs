//! Watcher error types.

use std::path::PathBuf;

/// Errors raised while starting a watch.
///
/// Once a watch is running, errors are logged and swallowed; nothing here
/// is produced after [`crate::FileWatcher::spawn`] returns.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Watched root does not exist.
    #[error("Watch directory not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// Watched root exists but is not a directory.
    #[error("Watch path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// I/O error while resolving the root.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The platform watcher could not be created or attached.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),
}
