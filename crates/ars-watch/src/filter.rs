//! Converts raw watcher batches into relative-path change events.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::WatchError;
use crate::event::{ChangeEvent, RawChange};
use crate::pattern::WatchPattern;
use crate::watcher::{FileWatcher, WatchHandle, resolve_root};

/// Receiving end of a filtered watch.
pub type ChangeReceiver = mpsc::Receiver<Vec<ChangeEvent>>;

/// Filters changes by include and ignore patterns relative to a root.
///
/// Holds no state beyond its configuration and performs no I/O.
#[derive(Clone, Debug)]
pub struct ChangeFilter {
    root: PathBuf,
    include: Vec<WatchPattern>,
    ignore: Vec<WatchPattern>,
}

impl ChangeFilter {
    /// Create a filter for `root` that keeps paths matching `pattern`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, pattern: &str) -> Self {
        Self {
            root: root.into(),
            include: vec![WatchPattern::new(pattern)],
            ignore: Vec::new(),
        }
    }

    /// Exclude paths matching any of `patterns`, even when they match the watch pattern.
    #[must_use]
    pub fn with_ignore<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignore
            .extend(patterns.into_iter().map(|p| WatchPattern::new(p.as_ref())));
        self
    }

    /// The root paths are made relative to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path relative to the root, `/`-separated.
    ///
    /// Returns `None` for the root itself and for paths outside it, which
    /// happens when symlinked content is reported under its real location.
    #[must_use]
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(s) => segments.push(s.to_string_lossy()),
                Component::CurDir => {}
                _ => return None,
            }
        }

        (!segments.is_empty()).then(|| segments.join("/"))
    }

    /// Whether a relative path passes the include and ignore patterns.
    #[must_use]
    pub fn is_relevant(&self, relative_path: &str) -> bool {
        self.include.iter().any(|p| p.matches(relative_path))
            && !self.ignore.iter().any(|p| p.matches(relative_path))
    }

    /// Call `handler` once for every change in `batch` that passes the filter.
    pub fn apply(&self, batch: &[RawChange], mut handler: impl FnMut(ChangeEvent)) {
        for change in batch {
            let Some(relative) = self.relative_path(&change.path) else {
                tracing::debug!(path = %change.path.display(), "Ignoring change outside watched root");
                continue;
            };
            if self.is_relevant(&relative) {
                handler(ChangeEvent::new(relative, change.kind));
            }
        }
    }

    /// Collect the changes in `batch` that pass the filter.
    #[must_use]
    pub fn filter(&self, batch: &[RawChange]) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        self.apply(batch, |event| events.push(event));
        events
    }

    /// Watch the root and receive filtered change batches.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is missing or cannot be watched.
    pub fn watch(mut self, debounce: Duration) -> Result<(WatchHandle, ChangeReceiver), WatchError> {
        self.root = resolve_root(&self.root)?;

        FileWatcher::new(self.root.clone())
            .with_debounce(debounce)
            .spawn(move |batch| self.filter(&batch))
    }
}
