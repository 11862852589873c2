//! File watching for autoreload-web-server.
//!
//! The pipeline runs in one direction:
//!
//! ```text
//! notify ──► EventDebouncer ──► drain task ──► ChangeFilter ──► mpsc channel
//!  (OS)      (coalesce burst)    (50ms tick)   (pattern test)    (Vec<ChangeEvent>)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ars_watch::{ChangeFilter, DEFAULT_DEBOUNCE};
//!
//! let (_handle, mut changes) = ChangeFilter::new("site", "**/*.html")
//!     .with_ignore(["drafts/**"])
//!     .watch(DEFAULT_DEBOUNCE)?;
//!
//! while let Some(batch) = changes.recv().await {
//!     for change in batch {
//!         println!("{} {}", change.kind.as_str(), change.path);
//!     }
//! }
//! ```

mod debouncer;
mod error;
mod event;
mod filter;
mod pattern;
mod watcher;

pub use error::WatchError;
pub use event::{ChangeEvent, ChangeKind, RawChange};
pub use filter::{ChangeFilter, ChangeReceiver};
pub use pattern::{WatchPattern, matches};
pub use watcher::{DEFAULT_DEBOUNCE, FileWatcher, WatchHandle};
