//! Change event types.

use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use serde::Serialize;

/// Kind of change observed on a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl ChangeKind {
    /// Lowercase name used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

/// A debounced change for an absolute path, as emitted by the file watcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// A change that passed the filter, with a `/`-separated path relative to the root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub path: String,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    #[must_use]
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Split a notify event into per-path change kinds.
///
/// Renames are reported as a removal of the old name and an addition of
/// the new one. Access and other events yield nothing.
pub(crate) fn classify(event: Event) -> Vec<(PathBuf, ChangeKind)> {
    let uniform = |kind: ChangeKind, paths: Vec<PathBuf>| {
        paths.into_iter().map(|p| (p, kind)).collect::<Vec<_>>()
    };

    match event.kind {
        EventKind::Create(_) => uniform(ChangeKind::Added, event.paths),
        EventKind::Remove(_) => uniform(ChangeKind::Removed, event.paths),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            uniform(ChangeKind::Removed, event.paths)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            uniform(ChangeKind::Added, event.paths)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event
            .paths
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                let kind = if i == 0 {
                    ChangeKind::Removed
                } else {
                    ChangeKind::Added
                };
                (p, kind)
            })
            .collect(),
        EventKind::Modify(_) => uniform(ChangeKind::Modified, event.paths),
        _ => Vec::new(),
    }
}
